//! Running total over the filtered task list

use chrono::Duration;
use parking_lot::Mutex;

/// Sum of recorded time across the listed tasks, kept current by deltas
/// instead of full reloads.
#[derive(Debug)]
pub struct FilteredTotal {
    total: Mutex<Duration>,
}

impl FilteredTotal {
    pub fn new() -> Self {
        Self {
            total: Mutex::new(Duration::zero()),
        }
    }

    pub fn get(&self) -> Duration {
        *self.total.lock()
    }

    pub fn reset(&self, total: Duration) {
        *self.total.lock() = total;
    }

    /// Apply a delta and return the new total.
    pub fn add(&self, delta: Duration) -> Duration {
        let mut total = self.total.lock();
        *total = *total + delta;
        *total
    }
}

impl Default for FilteredTotal {
    fn default() -> Self {
        Self::new()
    }
}
