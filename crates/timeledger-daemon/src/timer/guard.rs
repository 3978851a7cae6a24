//! Rapid-fire tick guard

use std::time::{Duration, Instant};

/// Rejects ticks that arrive closer together than a minimum spacing.
///
/// Timers that fall behind may deliver several ticks in a burst; only the
/// first of a burst gets through.
#[derive(Debug, Clone)]
pub struct RapidFiringDetector {
    min_spacing: Duration,
    last: Option<Instant>,
}

impl RapidFiringDetector {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last: None,
        }
    }

    /// True if `now` is too close to the last accepted tick. Accepted ticks
    /// become the new reference point.
    pub fn is_rapid_firing(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.min_spacing {
                return true;
            }
        }
        self.last = Some(now);
        false
    }
}

impl Default for RapidFiringDetector {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}
