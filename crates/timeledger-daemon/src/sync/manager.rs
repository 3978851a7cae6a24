//! Registry of live adapters

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use timeledger_core::models::{SegmentId, Task, TaskId, TimingConfig};
use timeledger_core::TransactionCoordinator;

use super::{Result, SegmentAdapter, SyncContext, SyncError, TaskAdapter};
use crate::event_manager::EventManager;
use crate::events::{SegmentEvent, TaskEvent, TotalEvent};
use crate::timer::TimingScheduler;

/// Owns the task and segment adapters, the filtered total and the single
/// "currently timing" segment.
///
/// A task has at most one adapter. It stays registered while it is listed
/// or while a segment adapter or caller still holds it, even if the
/// filters hide it for a while.
pub struct SyncManager {
    ctx: Arc<SyncContext>,
    tasks: RwLock<BTreeMap<TaskId, Arc<TaskAdapter>>>,
    listed: RwLock<BTreeSet<TaskId>>,
    timing: Mutex<Option<Arc<SegmentAdapter>>>,
}

impl SyncManager {
    /// Build the manager and start its timing scheduler on the current
    /// tokio runtime.
    pub fn new(
        coordinator: Arc<TransactionCoordinator>,
        events: Arc<EventManager>,
        timing: &TimingConfig,
    ) -> Self {
        let ctx = SyncContext {
            coordinator,
            events,
            totals: Default::default(),
            scheduler: TimingScheduler::start(timing),
            segments: Mutex::new(HashMap::new()),
        };
        Self {
            ctx: Arc::new(ctx),
            tasks: RwLock::new(BTreeMap::new()),
            listed: RwLock::new(BTreeSet::new()),
            timing: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.ctx.coordinator
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.ctx.events
    }

    pub fn scheduler(&self) -> &Arc<TimingScheduler> {
        &self.ctx.scheduler
    }

    /// Reload the filtered task list and recompute the total from it.
    pub fn reload_tasks(&self) -> Result<Vec<Arc<TaskAdapter>>> {
        let tasks = self.ctx.coordinator.get_all_tasks(true)?;
        let total = tasks
            .iter()
            .fold(Duration::zero(), |sum, t| sum + t.total_duration());

        let mut registry = self.tasks.write();
        let mut listed = BTreeSet::new();
        let mut adapters = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = task.id();
            let adapter = match registry.get(&id) {
                Some(adapter) => {
                    adapter.replace(task);
                    adapter.clone()
                }
                None => {
                    let adapter = TaskAdapter::new(self.ctx.clone(), task);
                    registry.insert(id, adapter.clone());
                    adapter
                }
            };
            listed.insert(id);
            adapters.push(adapter);
        }
        // Hidden adapters nothing else refers to can be rebuilt on demand
        registry.retain(|id, adapter| listed.contains(id) || Arc::strong_count(adapter) > 1);
        *self.listed.write() = listed;
        drop(registry);

        self.ctx.totals.reset(total);
        self.ctx
            .events
            .emit_total(TotalEvent::new(total.num_seconds()));
        tracing::debug!("Reloaded tasks, filtered total {}s", total.num_seconds());
        Ok(adapters)
    }

    /// Adapters listed by the last reload plus any created since.
    pub fn tasks(&self) -> Vec<Arc<TaskAdapter>> {
        let registry = self.tasks.read();
        self.listed
            .read()
            .iter()
            .filter_map(|id| registry.get(id).cloned())
            .collect()
    }

    pub fn is_listed(&self, id: TaskId) -> bool {
        self.listed.read().contains(&id)
    }

    /// Adapter for a task, loading it if it is not registered yet.
    pub fn task(&self, id: TaskId) -> Result<Arc<TaskAdapter>> {
        if let Some(adapter) = self.tasks.read().get(&id) {
            return Ok(adapter.clone());
        }

        let task = self
            .ctx
            .coordinator
            .get_task_by_id(id)?
            .ok_or(SyncError::TaskNotFound(id))?;
        let mut registry = self.tasks.write();
        let adapter = registry
            .entry(id)
            .or_insert_with(|| TaskAdapter::new(self.ctx.clone(), task));
        Ok(adapter.clone())
    }

    pub fn create_task(&self) -> Result<Arc<TaskAdapter>> {
        let task = self.ctx.coordinator.create_task()?;
        Ok(self.register_new(task))
    }

    fn register_new(&self, task: Task) -> Arc<TaskAdapter> {
        let adapter = TaskAdapter::new(self.ctx.clone(), task.clone());
        self.tasks.write().insert(adapter.id(), adapter.clone());
        self.listed.write().insert(adapter.id());
        self.ctx.events.emit_task(TaskEvent::created(task));
        adapter
    }

    /// Delete a task and its segments, stopping its timer first.
    pub fn delete_task(&self, id: TaskId) -> Result<bool> {
        if let Some(segment) = self.timing_segment() {
            if segment.owner().id() == id {
                self.stop_timing()?;
            }
        }

        let total = self
            .ctx
            .coordinator
            .get_task_by_id(id)?
            .map(|task| task.total_duration());
        let deleted = self.ctx.coordinator.delete_task(id)?;

        self.tasks.write().remove(&id);
        let was_listed = self.listed.write().remove(&id);
        self.ctx
            .segments
            .lock()
            .retain(|_, segment| segment.owner().id() != id);

        if deleted {
            // Only listed tasks contributed to the total
            if let (true, Some(total)) = (was_listed, total) {
                self.ctx.report_delta(-total);
            }
            self.ctx.events.emit_task(TaskEvent::deleted(id));
            tracing::info!("Deleted task {}", id);
        }
        Ok(deleted)
    }

    pub fn duplicate_task(&self, id: TaskId) -> Result<Arc<TaskAdapter>> {
        let task = self.ctx.coordinator.duplicate_task(id)?;
        Ok(self.register_new(task))
    }

    /// Add an empty segment to a task.
    pub fn create_segment(&self, task: TaskId) -> Result<Arc<SegmentAdapter>> {
        let owner = self.task(task)?;
        let segment = self.ctx.coordinator.create_time_segment(task)?;
        let adapter = SegmentAdapter::new(self.ctx.clone(), segment, owner.clone());
        self.ctx.segments.lock().insert(adapter.id(), adapter.clone());

        owner.update_from_database()?;
        self.ctx
            .events
            .emit_segment(SegmentEvent::created(adapter.view()));
        Ok(adapter)
    }

    /// Adapters for every segment of a task, ordered by start time.
    pub fn segments_of(&self, task: TaskId) -> Result<Vec<Arc<SegmentAdapter>>> {
        let owner = self.task(task)?;
        owner.update_from_database()?;

        let mut registry = self.ctx.segments.lock();
        let adapters = owner
            .snapshot()
            .segments()
            .iter()
            .map(|segment| {
                registry
                    .entry(segment.id())
                    .or_insert_with(|| {
                        SegmentAdapter::new(self.ctx.clone(), segment.clone(), owner.clone())
                    })
                    .clone()
            })
            .collect();
        Ok(adapters)
    }

    pub fn delete_segment(&self, id: SegmentId) -> Result<bool> {
        if self
            .timing_segment()
            .is_some_and(|segment| segment.id() == id)
        {
            self.stop_timing()?;
        }

        let segment = self.ctx.coordinator.get_time_segment_by_id(id)?;
        let deleted = self
            .ctx
            .coordinator
            .perform_change(|uow| uow.delete_time_segment(id))?;
        self.ctx.segments.lock().remove(&id);

        if let (true, Some(segment)) = (deleted, segment) {
            self.ctx.report_delta(-segment.duration());
            if let Some(owner) = self.tasks.read().get(&segment.owner()).cloned() {
                owner.update_from_database()?;
            }
            self.ctx.events.emit_segment(SegmentEvent::deleted(id));
        }
        Ok(deleted)
    }

    /// Stop whatever is timing, then time a fresh segment of `task`.
    pub fn start_timing_task(&self, task: TaskId) -> Result<Arc<SegmentAdapter>> {
        self.stop_timing()?;

        let segment = self.create_segment(task)?;
        segment.start_timing()?;
        *self.timing.lock() = Some(segment.clone());
        Ok(segment)
    }

    /// Stop the timing segment, if any, returning its final end time.
    pub fn stop_timing(&self) -> Result<Option<DateTime<Utc>>> {
        let current = self.timing.lock().take();
        match current {
            Some(segment) => Ok(Some(segment.stop_timing()?)),
            None => Ok(None),
        }
    }

    pub fn timing_segment(&self) -> Option<Arc<SegmentAdapter>> {
        self.timing.lock().clone()
    }

    pub fn filtered_total(&self) -> Duration {
        self.ctx.totals.get()
    }

    /// Stop timing, halt the scheduler and close the coordinator.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down sync manager");
        if let Err(e) = self.stop_timing() {
            tracing::warn!("Failed to stop timing during shutdown: {}", e);
        }
        self.ctx.scheduler.shutdown().await;
        self.ctx.segments.lock().clear();
        self.tasks.write().clear();
        self.listed.write().clear();
        self.ctx.coordinator.shutdown()?;
        Ok(())
    }
}

impl Drop for SyncManager {
    // Segment adapters point back at the shared context
    fn drop(&mut self) {
        self.ctx.segments.lock().clear();
    }
}
