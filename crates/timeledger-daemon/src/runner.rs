//! Background job runner
//!
//! Runs one blocking job at a time off the async runtime. Starting a job
//! waits for the previous one, so the queue never holds more than one.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::event_manager::EventManager;
use crate::events::BackgroundEvent;
use crate::sync::SyncError;

pub struct BackgroundRunner {
    events: Arc<EventManager>,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundRunner {
    pub fn new(events: Arc<EventManager>) -> Self {
        Self {
            events,
            current: Mutex::new(None),
        }
    }

    /// Wait for the running job, then start `job`.
    pub async fn start<F>(&self, name: impl Into<String>, job: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            if let Err(e) = previous.await {
                tracing::error!("Background job panicked: {}", e);
            }
        }

        tracing::debug!("Starting background job '{}'", name);
        self.events.emit_background(BackgroundEvent::started(&name));

        let events = self.events.clone();
        *current = Some(tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(job).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("job panicked: {}", e)),
            };

            match result {
                Ok(()) => {
                    tracing::info!("Background job '{}' finished", name);
                    events.emit_background(BackgroundEvent::finished(&name));
                }
                Err(e) if is_shutting_down(&e) => {
                    tracing::debug!("Background job '{}' stopped by shutdown", name);
                }
                Err(e) => {
                    tracing::error!("Background job '{}' failed: {:#}", name, e);
                    events.emit_background(BackgroundEvent::failed(&name, format!("{:#}", e)));
                }
            }
        }));
    }

    /// Wait for the current job, if any.
    pub async fn complete(&self) {
        let handle = self.current.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Background job panicked: {}", e);
            }
        }
    }

    pub async fn is_busy(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn is_shutting_down(error: &anyhow::Error) -> bool {
    if let Some(e) = error.downcast_ref::<timeledger_core::Error>() {
        return e.is_shutting_down();
    }
    if let Some(e) = error.downcast_ref::<SyncError>() {
        return e.is_shutting_down();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BackgroundEventType, DaemonEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_jobs_never_overlap() {
        let runner = BackgroundRunner::new(Arc::new(EventManager::new()));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let running = running.clone();
            let peak = peak.clone();
            runner
                .start(format!("job-{}", i), move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }
        runner.complete().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!runner.is_busy().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_is_reported() {
        let events = Arc::new(EventManager::new());
        let mut rx = events.subscribe();
        let runner = BackgroundRunner::new(events);

        runner
            .start("export", || Err(anyhow::anyhow!("disk full")))
            .await;
        runner.complete().await;

        let started = rx.recv().await.unwrap();
        assert!(matches!(
            started,
            DaemonEvent::Background(ref e) if e.event_type == BackgroundEventType::Started
        ));
        match rx.recv().await.unwrap() {
            DaemonEvent::Background(e) => match e.event_type {
                BackgroundEventType::Failed { error } => assert!(error.contains("disk full")),
                other => panic!("unexpected event {:?}", other),
            },
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_error_is_silent() {
        let events = Arc::new(EventManager::new());
        let mut rx = events.subscribe();
        let runner = BackgroundRunner::new(events);

        runner
            .start("refresh", || Err(timeledger_core::Error::ShuttingDown.into()))
            .await;
        runner.complete().await;

        // Only the start notice is published
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }
}
