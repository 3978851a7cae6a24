//! Live time segment adapter

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use timeledger_core::models::timestamp::{self, normalize};
use timeledger_core::models::{SegmentId, TaskId, TimeSegment};

use super::{Result, SyncContext, TaskAdapter};
use crate::events::{SegmentEvent, TimingEvent};
use crate::timer::TickTarget;

/// Display fields derived from a segment and its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentView {
    pub id: SegmentId,
    pub owner: TaskId,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// HH:MM:SS
    pub duration: String,
    /// "owner - description (duration)"
    pub full_description: String,
    pub timing: bool,
}

struct SegmentState {
    segment: TimeSegment,
    owner: Arc<TaskAdapter>,
    timing: bool,
}

/// Wraps one stored segment.
///
/// The state lock is held for the whole of each edit, so a tick racing
/// with [`SegmentAdapter::stop_timing`] either completes first or sees the
/// segment already stopped.
pub struct SegmentAdapter {
    ctx: Arc<SyncContext>,
    id: SegmentId,
    state: Mutex<SegmentState>,
}

impl SegmentAdapter {
    pub(crate) fn new(
        ctx: Arc<SyncContext>,
        segment: TimeSegment,
        owner: Arc<TaskAdapter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            id: segment.id(),
            state: Mutex::new(SegmentState {
                segment,
                owner,
                timing: false,
            }),
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn owner(&self) -> Arc<TaskAdapter> {
        self.state.lock().owner.clone()
    }

    pub fn segment(&self) -> TimeSegment {
        self.state.lock().segment.clone()
    }

    pub fn is_timing(&self) -> bool {
        self.state.lock().timing
    }

    pub fn view(&self) -> SegmentView {
        Self::view_of(&self.state.lock())
    }

    fn view_of(state: &SegmentState) -> SegmentView {
        let duration = state.segment.duration_formatted();
        SegmentView {
            id: state.segment.id(),
            owner: state.owner.id(),
            description: state.segment.description().to_string(),
            start: state.segment.start(),
            end: state.segment.end(),
            full_description: format!(
                "{} - {} ({})",
                state.owner.name(),
                state.segment.description(),
                duration
            ),
            duration,
            timing: state.timing,
        }
    }

    fn publish(&self, state: MutexGuard<'_, SegmentState>) {
        let view = Self::view_of(&state);
        drop(state);
        self.ctx.events.emit_segment(SegmentEvent::updated(view));
    }

    pub fn set_description(&self, description: impl Into<String>) -> Result<()> {
        let description = description.into();
        let mut state = self.state.lock();
        if state.segment.description() == description {
            return Ok(());
        }

        let id = self.id;
        state.segment = self.ctx.coordinator.perform_change(move |uow| {
            let mut segment = uow.time_segment(id)?;
            segment.set_description(description);
            uow.save_time_segment(&segment)?;
            Ok(segment)
        })?;
        self.publish(state);
        Ok(())
    }

    pub fn set_start(&self, start: DateTime<Utc>) -> Result<()> {
        let start = normalize(start);
        let mut state = self.state.lock();
        if state.segment.start() == start {
            return Ok(());
        }
        self.change_times(&mut state, |segment| segment.set_start(start))?;
        self.publish(state);
        Ok(())
    }

    pub fn set_end(&self, end: DateTime<Utc>) -> Result<()> {
        let end = normalize(end);
        let mut state = self.state.lock();
        if state.segment.end() == end {
            return Ok(());
        }
        self.change_times(&mut state, |segment| segment.set_end(end))?;
        self.publish(state);
        Ok(())
    }

    /// Set both bounds in one unit of work.
    pub fn set_start_end(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        let (start, end) = (normalize(start), normalize(end));
        let mut state = self.state.lock();
        if state.segment.start() == start && state.segment.end() == end {
            return Ok(());
        }
        self.change_times(&mut state, |segment| segment.set_start_end(start, end))?;
        self.publish(state);
        Ok(())
    }

    /// Move the segment to another task. A running timer follows it.
    pub fn set_owner(&self, owner: Arc<TaskAdapter>) -> Result<()> {
        let mut state = self.state.lock();
        let previous = state.owner.clone();
        if previous.id() == owner.id() {
            return Ok(());
        }

        if state.timing {
            previous.unbind_timing(self.id);
            owner.bind_timing(self.id);
        }

        let (id, owner_id) = (self.id, owner.id());
        let result = self.ctx.coordinator.perform_change(move |uow| {
            let mut segment = uow.time_segment(id)?;
            segment.set_owner(owner_id);
            uow.save_time_segment(&segment)?;
            Ok(segment)
        });

        let segment = match result {
            Ok(segment) => segment,
            Err(e) => {
                if state.timing {
                    owner.unbind_timing(self.id);
                    previous.bind_timing(self.id);
                }
                return Err(e.into());
            }
        };

        state.segment = segment;
        state.owner = owner.clone();
        previous.update_from_database()?;
        owner.update_from_database()?;
        self.publish(state);
        Ok(())
    }

    /// Begin timing: bind the owner's indicator and register for ticks.
    pub fn start_timing(self: &Arc<Self>) -> Result<()> {
        let owner = {
            let mut state = self.state.lock();
            if state.timing {
                return Ok(());
            }
            state.timing = true;
            state.owner.bind_timing(self.id);
            state.owner.id()
        };

        let target: Arc<dyn TickTarget> = self.clone();
        self.ctx.scheduler.schedule(self.id, target);
        self.ctx
            .events
            .emit_timing(TimingEvent::started(self.id, owner));
        tracing::info!("Started timing segment {}", self.id);
        Ok(())
    }

    /// Set the end to now while timing.
    ///
    /// Closed-gate errors are ignored once shutdown has begun.
    pub fn update_timing(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.timing {
            return Ok(());
        }

        let now = timestamp::now();
        if state.segment.end() == now {
            return Ok(());
        }
        let result = self.change_times(&mut state, |segment| segment.set_end(now));
        self.ctx.suppress_shutdown(result, ())?;
        self.publish(state);
        Ok(())
    }

    /// Cancel ticks, write the final end time and clear the indicators.
    /// Returns the end time left on the segment.
    pub fn stop_timing(&self) -> Result<DateTime<Utc>> {
        self.ctx.scheduler.cancel(self.id);

        let mut state = self.state.lock();
        if !state.timing {
            return Err(super::SyncError::NotTiming(self.id));
        }

        let end = timestamp::now();
        let result = self.change_times(&mut state, |segment| segment.set_end(end));
        state.timing = false;
        state.owner.unbind_timing(self.id);
        let owner = state.owner.id();
        let final_end = state.segment.end();

        let view = Self::view_of(&state);
        drop(state);

        self.ctx.suppress_shutdown(result, ())?;
        self.ctx
            .events
            .emit_timing(TimingEvent::stopped(self.id, owner, final_end));
        self.ctx.events.emit_segment(SegmentEvent::updated(view));
        tracing::info!("Stopped timing segment {} at {}", self.id, final_end);
        Ok(final_end)
    }

    fn change_times<F>(&self, state: &mut SegmentState, apply: F) -> Result<()>
    where
        F: FnOnce(&mut TimeSegment),
    {
        let previous = state.segment.duration();
        let id = self.id;
        let segment = self.ctx.coordinator.perform_change(move |uow| {
            let mut segment = uow.time_segment(id)?;
            apply(&mut segment);
            uow.save_time_segment(&segment)?;
            Ok(segment)
        })?;

        let delta = segment.duration() - previous;
        state.segment = segment;
        self.ctx.report_delta(delta);
        state.owner.update_from_database()
    }
}

impl TickTarget for SegmentAdapter {
    fn tick(&self) {
        if let Err(e) = self.update_timing() {
            tracing::warn!("Timing update for segment {} failed: {}", self.id, e);
        }
    }
}
