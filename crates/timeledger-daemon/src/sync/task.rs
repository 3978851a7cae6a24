//! Live task adapter

use chrono::Duration;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use timeledger_core::models::{CustomFieldId, SegmentId, Task, TaskId};

use super::{Result, SyncContext};
use crate::events::TaskEvent;

struct TaskState {
    task: Task,
    /// Segments currently timing under this task
    timing: BTreeSet<SegmentId>,
}

pub struct TaskAdapter {
    ctx: Arc<SyncContext>,
    id: TaskId,
    state: Mutex<TaskState>,
}

impl TaskAdapter {
    pub(crate) fn new(ctx: Arc<SyncContext>, task: Task) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            id: task.id(),
            state: Mutex::new(TaskState {
                task,
                timing: BTreeSet::new(),
            }),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Copy of the last committed record.
    pub fn snapshot(&self) -> Task {
        self.state.lock().task.clone()
    }

    pub fn name(&self) -> String {
        self.state.lock().task.name.clone()
    }

    pub fn total_duration(&self) -> Duration {
        self.state.lock().task.total_duration()
    }

    /// True while one of this task's segments is timing.
    pub fn is_timing(&self) -> bool {
        !self.state.lock().timing.is_empty()
    }

    pub(crate) fn bind_timing(&self, segment: SegmentId) {
        self.state.lock().timing.insert(segment);
    }

    pub(crate) fn unbind_timing(&self, segment: SegmentId) {
        self.state.lock().timing.remove(&segment);
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.state.lock().task.name == name {
            return Ok(());
        }
        self.edit(move |task| task.name = name)?;
        self.ctx.republish_segments(self.id);
        Ok(())
    }

    pub fn set_description(&self, description: impl Into<String>) -> Result<()> {
        let description = description.into();
        if self.state.lock().task.description == description {
            return Ok(());
        }
        self.edit(move |task| task.description = description)
    }

    pub fn set_completed(&self, completed: bool) -> Result<()> {
        if self.state.lock().task.completed == completed {
            return Ok(());
        }
        self.edit(move |task| task.completed = completed)
    }

    /// Assign a custom field value; `None` clears it.
    pub fn set_custom_field(&self, field: CustomFieldId, value: Option<String>) -> Result<()> {
        if self.state.lock().task.custom_field(field) == value.as_deref() {
            return Ok(());
        }
        self.edit(move |task| task.set_custom_field(field, value))
    }

    /// Reload the record, e.g. after one of its segments changed.
    pub fn update_from_database(&self) -> Result<()> {
        if let Some(task) = self.ctx.coordinator.get_task_by_id(self.id)? {
            self.replace(task);
        }
        Ok(())
    }

    pub(crate) fn replace(&self, task: Task) {
        self.state.lock().task = task.clone();
        self.ctx.events.emit_task(TaskEvent::updated(task));
    }

    fn edit<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Task),
    {
        let id = self.id;
        let task = self.ctx.coordinator.perform_change(move |uow| {
            let mut task = uow.task(id)?;
            mutate(&mut task);
            uow.save_task(&task)?;
            Ok(task)
        })?;
        self.replace(task);
        Ok(())
    }
}
