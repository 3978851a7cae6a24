//! timeledger daemon
//!
//! Opens the ledger, wires up live sync and runs one command through the
//! background runner. Without a command it keeps the store open and logs
//! change events until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use timeledger_core::models::timestamp::format_duration;
use timeledger_core::models::TaskId;
use timeledger_core::storage::{database_path, init_data_dir};
use timeledger_core::transfer::{CsvExporter, JsonExporter, JsonImporter};
use timeledger_core::TransactionCoordinator;
use timeledger_daemon::events::BackgroundEventType;
use timeledger_daemon::{
    BackgroundRunner, ConfigManager, DaemonEvent, EventManager, Preferences, SyncManager,
};
use tokio::sync::broadcast::error::TryRecvError;

#[derive(Parser, Debug)]
#[command(name = "timeledgerd")]
#[command(about = "timeledger daemon - task time ledger backend", long_about = None)]
struct Args {
    /// Data directory holding the database and log file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level; defaults to the configured level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tasks with their recorded time
    List {
        /// Apply the stored filters
        #[arg(long)]
        filtered: bool,
    },
    /// Delete time segments no task owns
    Cleanup,
    /// Export the ledger
    Export {
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        path: PathBuf,
    },
    /// Import a JSON export
    Import { path: PathBuf },
    /// Time a task for a number of seconds
    Track {
        task_id: i64,
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new()?;
    let config = config_manager.get().await;

    let data_dir = match args.data_dir.clone() {
        Some(dir) => {
            fs::create_dir_all(&dir)?;
            dir
        }
        None => init_data_dir()?,
    };
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    let log_file_path = data_dir.join("daemon.log");

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    // Log to both the file and stdout
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    let stdout_writer = std::io::stdout.with_max_level(tracing::Level::INFO);
    let file_writer = log_file.with_max_level(tracing::Level::DEBUG);

    tracing_subscriber::fmt()
        .with_writer(stdout_writer.and(file_writer))
        .with_env_filter(log_level.as_str())
        .with_ansi(false)
        .init();

    let db_path = database_path(&config, &data_dir);
    tracing::info!("timeledger daemon starting...");
    tracing::info!("Config file: {}", config_manager.path().display());
    tracing::info!("Database: {}", db_path.display());
    tracing::info!("Log file: {}", log_file_path.display());

    let coordinator = Arc::new(
        TransactionCoordinator::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?,
    );
    let events = Arc::new(EventManager::new());
    let sync = Arc::new(SyncManager::new(
        coordinator.clone(),
        events.clone(),
        &config.timing,
    ));
    let preferences = Arc::new(Preferences::new(coordinator));
    let runner = BackgroundRunner::new(events.clone());
    tracing::info!("Sync manager initialized");

    let result = match args.command {
        Some(command) => {
            let mut rx = events.subscribe();
            run_command(command, &runner, &sync, &preferences).await;
            runner.complete().await;
            first_failure(&mut rx)
        }
        None => serve(&events).await,
    };

    sync.shutdown().await?;
    tracing::info!("timeledger daemon stopped");
    result
}

async fn run_command(
    command: Command,
    runner: &BackgroundRunner,
    sync: &Arc<SyncManager>,
    preferences: &Arc<Preferences>,
) {
    match command {
        Command::List { filtered } => {
            let sync = sync.clone();
            runner
                .start("list", move || {
                    let tasks = if filtered {
                        sync.reload_tasks()?
                            .iter()
                            .map(|adapter| adapter.snapshot())
                            .collect()
                    } else {
                        sync.coordinator().get_all_tasks(false)?
                    };
                    for task in &tasks {
                        println!(
                            "{:>6}  {}  {}{}",
                            task.id(),
                            format_duration(task.total_duration()),
                            task.name,
                            if task.completed { " (completed)" } else { "" }
                        );
                    }
                    if filtered {
                        println!("Total: {}", format_duration(sync.filtered_total()));
                    }
                    Ok(())
                })
                .await;
        }
        Command::Cleanup => {
            let sync = sync.clone();
            runner
                .start("cleanup", move || {
                    let removed = sync.coordinator().cleanup_orphans()?;
                    println!("Removed {} orphaned time segments", removed);
                    Ok(())
                })
                .await;
        }
        Command::Export { format, path } => {
            let sync = sync.clone();
            let preferences = preferences.clone();
            runner
                .start("export", move || {
                    match format {
                        Format::Json => {
                            let mut exporter = JsonExporter::create(&path)?;
                            sync.coordinator().export_data(&mut exporter)?;
                        }
                        Format::Csv => {
                            let mut exporter = CsvExporter::create(&path)?;
                            sync.coordinator().export_data(&mut exporter)?;
                            exporter.into_inner()?;
                        }
                    }
                    preferences.remember_file(&path)?;
                    println!("Exported to {}", path.display());
                    Ok(())
                })
                .await;
        }
        Command::Import { path } => {
            let sync = sync.clone();
            let preferences = preferences.clone();
            runner
                .start("import", move || {
                    let mut importer = JsonImporter::open(&path)?;
                    sync.coordinator().import_data(&mut importer)?;
                    preferences.remember_file(&path)?;
                    println!("Imported {}", path.display());
                    Ok(())
                })
                .await;
        }
        Command::Track { task_id, seconds } => {
            let task = TaskId(task_id);
            let start = sync.clone();
            runner
                .start("track", move || {
                    let segment = start.start_timing_task(task)?;
                    println!("Timing segment {} of task {}", segment.id(), task);
                    Ok(())
                })
                .await;
            runner.complete().await;

            if sync.timing_segment().is_some() {
                tokio::time::sleep(Duration::from_secs(seconds)).await;
            }

            let stop = sync.clone();
            runner
                .start("stop", move || {
                    if let Some(end) = stop.stop_timing()? {
                        println!("Stopped at {}", end);
                    }
                    Ok(())
                })
                .await;
        }
    }
}

/// Log change events until Ctrl-C.
async fn serve(events: &EventManager) -> Result<()> {
    let mut rx = events.subscribe();
    tracing::info!("Daemon ready");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutting down...");
                return Ok(());
            }
            event = rx.recv() => match event {
                Ok(event) => tracing::debug!("Event: {}", serde_json::to_string(&event)?),
                Err(e) => tracing::warn!("Event stream: {}", e),
            }
        }
    }
}

fn first_failure(rx: &mut tokio::sync::broadcast::Receiver<DaemonEvent>) -> Result<()> {
    loop {
        match rx.try_recv() {
            Ok(DaemonEvent::Background(event)) => {
                if let BackgroundEventType::Failed { error } = event.event_type {
                    anyhow::bail!("{} failed: {}", event.name, error);
                }
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
        }
    }
}
