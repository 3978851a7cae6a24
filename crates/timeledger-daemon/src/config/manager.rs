//! Configuration manager

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use timeledger_core::{
    models::Config,
    storage::{init_config_dir, ConfigStorage},
    Result as CoreResult,
};

/// Config manager error
#[derive(Debug, thiserror::Error)]
pub enum ConfigManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] timeledger_core::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigManagerError>;

/// Caches `config.json` and writes every change back through
/// [`ConfigStorage`].
pub struct ConfigManager {
    storage: ConfigStorage,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    pub fn new() -> CoreResult<Self> {
        Self::with_dir(init_config_dir()?)
    }

    pub fn with_dir(config_dir: PathBuf) -> CoreResult<Self> {
        let storage = ConfigStorage::new(config_dir);
        let config = storage.load()?;

        Ok(Self {
            storage,
            config: Arc::new(RwLock::new(config)),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.storage.path()
    }

    pub async fn get(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn update(&self, config: Config) -> Result<Config> {
        config
            .validate()
            .map_err(|e| ConfigManagerError::Invalid(e.to_string()))?;

        self.storage.save(&config)?;

        {
            let mut current = self.config.write().await;
            *current = config.clone();
        }

        tracing::debug!("Configuration saved to {}", self.storage.path().display());
        Ok(config)
    }

    pub async fn set_database_path(&self, path: Option<PathBuf>) -> Result<Config> {
        let mut config = self.get().await;
        config.store.database_path = path;
        self.update(config).await
    }

    pub async fn update_timing_config(
        &self,
        tick_interval_ms: Option<u64>,
        min_tick_spacing_ms: Option<u64>,
    ) -> Result<Config> {
        let mut config = self.get().await;

        if let Some(interval) = tick_interval_ms {
            config.timing.tick_interval_ms = interval;
        }

        if let Some(spacing) = min_tick_spacing_ms {
            config.timing.min_tick_spacing_ms = spacing;
        }

        self.update(config).await
    }

    pub async fn update_daemon_config(&self, log_level: Option<String>) -> Result<Config> {
        let mut config = self.get().await;

        if let Some(level) = log_level {
            config.daemon.log_level = level;
        }

        self.update(config).await
    }

    pub async fn reset_to_default(&self) -> Result<Config> {
        self.update(Config::default()).await
    }
}
