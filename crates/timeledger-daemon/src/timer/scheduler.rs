//! Single tick loop for every timing segment

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use timeledger_core::models::{SegmentId, TimingConfig};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::guard::RapidFiringDetector;
use super::TickTarget;

struct Entry {
    target: Arc<dyn TickTarget>,
    detector: RapidFiringDetector,
}

type Entries = Arc<Mutex<HashMap<SegmentId, Entry>>>;

/// Drives all timing segments from one tokio task.
///
/// Cancelling a segment removes its entry; the loop only ever sees the
/// entries present when a tick fires.
pub struct TimingScheduler {
    entries: Entries,
    min_spacing: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimingScheduler {
    /// Start the tick loop on the current tokio runtime.
    pub fn start(config: &TimingConfig) -> Arc<Self> {
        Self::with_intervals(config.tick_interval(), config.min_tick_spacing())
    }

    pub fn with_intervals(tick_interval: Duration, min_spacing: Duration) -> Arc<Self> {
        let entries: Entries = Arc::new(Mutex::new(HashMap::new()));
        let handle = tokio::spawn(Self::run(entries.clone(), tick_interval));

        Arc::new(Self {
            entries,
            min_spacing,
            handle: Mutex::new(Some(handle)),
        })
    }

    async fn run(entries: Entries, tick_interval: Duration) {
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let due: Vec<Arc<dyn TickTarget>> = {
                let mut entries = entries.lock();
                let now = Instant::now();
                entries
                    .values_mut()
                    .filter_map(|entry| {
                        (!entry.detector.is_rapid_firing(now)).then(|| entry.target.clone())
                    })
                    .collect()
            };
            if due.is_empty() {
                continue;
            }

            let result = tokio::task::spawn_blocking(move || {
                for target in due {
                    target.tick();
                }
            })
            .await;

            if let Err(e) = result {
                tracing::error!("Tick worker failed: {}", e);
            }
        }
    }

    /// Register a segment; replaces an existing entry for the same id.
    pub fn schedule(&self, id: SegmentId, target: Arc<dyn TickTarget>) {
        tracing::debug!("Scheduling ticks for segment {}", id);
        self.entries.lock().insert(
            id,
            Entry {
                target,
                detector: RapidFiringDetector::new(self.min_spacing),
            },
        );
    }

    /// Stop delivering ticks to a segment. Returns false if it had no entry.
    pub fn cancel(&self, id: SegmentId) -> bool {
        let removed = self.entries.lock().remove(&id).is_some();
        if removed {
            tracing::debug!("Cancelled ticks for segment {}", id);
        }
        removed
    }

    pub fn is_scheduled(&self, id: SegmentId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Stop the loop and drop every entry.
    pub async fn shutdown(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl TickTarget for Counter {
        fn tick(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Counter {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ticks_until_cancelled() {
        let scheduler =
            TimingScheduler::with_intervals(Duration::from_millis(50), Duration::from_millis(10));
        let counter = Arc::new(Counter::default());

        scheduler.schedule(SegmentId(1), counter.clone());
        assert!(scheduler.is_scheduled(SegmentId(1)));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(counter.count() >= 2);

        assert!(scheduler.cancel(SegmentId(1)));
        assert!(!scheduler.cancel(SegmentId(1)));
        // Let any tick already in flight finish
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_cancel = counter.count();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.count(), after_cancel);

        scheduler.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_one_loop_serves_many_segments() {
        let scheduler =
            TimingScheduler::with_intervals(Duration::from_millis(50), Duration::from_millis(10));
        let counters: Vec<_> = (0..3).map(|_| Arc::new(Counter::default())).collect();
        for (i, counter) in counters.iter().enumerate() {
            scheduler.schedule(SegmentId(i as i64), counter.clone());
        }
        assert_eq!(scheduler.active_count(), 3);

        tokio::time::sleep(Duration::from_millis(300)).await;
        for counter in &counters {
            assert!(counter.count() >= 2);
        }

        scheduler.shutdown().await;
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spacing_limits_tick_rate() {
        // Spacing above the interval lets through at most every other tick
        let scheduler =
            TimingScheduler::with_intervals(Duration::from_millis(40), Duration::from_millis(100));
        let counter = Arc::new(Counter::default());
        scheduler.schedule(SegmentId(1), counter.clone());

        tokio::time::sleep(Duration::from_millis(420)).await;
        scheduler.shutdown().await;

        // About ten ticks fired; spacing admits at most five of them
        assert!(counter.count() >= 1);
        assert!(counter.count() <= 5);
    }
}
