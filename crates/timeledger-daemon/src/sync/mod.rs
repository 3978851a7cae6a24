//! Live views over stored tasks and segments
//!
//! Adapters push every edit through the coordinator, refresh themselves
//! from the committed record and then publish a change event. Nothing
//! listens back into an adapter, so an edit never re-triggers itself.

pub mod manager;
pub mod segment;
pub mod task;
pub mod totals;

pub use manager::SyncManager;
pub use segment::{SegmentAdapter, SegmentView};
pub use task::TaskAdapter;
pub use totals::FilteredTotal;

use chrono::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use timeledger_core::models::{SegmentId, TaskId};
use timeledger_core::TransactionCoordinator;

use crate::event_manager::EventManager;
use crate::events::{SegmentEvent, TotalEvent};
use crate::timer::TimingScheduler;

/// Sync layer error
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] timeledger_core::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Time segment not found: {0}")]
    SegmentNotFound(SegmentId),

    #[error("Time segment {0} is not being timed")]
    NotTiming(SegmentId),
}

impl SyncError {
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, SyncError::Core(e) if e.is_shutting_down())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Handles every adapter shares.
pub(crate) struct SyncContext {
    pub coordinator: Arc<TransactionCoordinator>,
    pub events: Arc<EventManager>,
    pub totals: FilteredTotal,
    pub scheduler: Arc<TimingScheduler>,
    /// Live segment adapters by id
    pub segments: Mutex<HashMap<SegmentId, Arc<SegmentAdapter>>>,
}

impl SyncContext {
    /// Fold a duration change into the filtered total and announce it.
    pub fn report_delta(&self, delta: Duration) {
        if delta == Duration::zero() {
            return;
        }
        let total = self.totals.add(delta);
        self.events.emit_total(TotalEvent::new(total.num_seconds()));
    }

    /// Re-announce the segments of `task`, whose views embed its name.
    pub fn republish_segments(&self, task: TaskId) {
        let owned: Vec<Arc<SegmentAdapter>> = self
            .segments
            .lock()
            .values()
            .filter(|segment| segment.owner().id() == task)
            .cloned()
            .collect();
        for segment in owned {
            self.events
                .emit_segment(SegmentEvent::updated(segment.view()));
        }
    }

    /// Swallow a closed-gate error while shutdown is actually in progress.
    pub fn suppress_shutdown<T>(&self, result: Result<T>, fallback: T) -> Result<T> {
        match result {
            Err(e) if e.is_shutting_down() && self.coordinator.is_shutting_down() => {
                tracing::debug!("Ignoring update during shutdown: {}", e);
                Ok(fallback)
            }
            other => other,
        }
    }
}
