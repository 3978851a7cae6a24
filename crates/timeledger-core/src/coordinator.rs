//! Transaction coordinator
//!
//! Every read and write of the record store goes through a
//! [`TransactionCoordinator`]. Operations share a readers-writer gate;
//! [`TransactionCoordinator::shutdown`] takes it exclusively, so it waits for
//! in-flight work and every later call fails with [`Error::ShuttingDown`].
//! Calls arriving while it waits queue behind it.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::models::{
    ConfigurationElement, CustomField, CustomFieldId, DateType, Filter, FilterId, FilterKind,
    SegmentId, Task, TaskId, TimeSegment,
};
use crate::query::FilterSet;
use crate::storage::{Database, Mergeable, UnitOfWork};
use crate::transfer::{Exporter, Importer};
use crate::{Error, Result};

thread_local! {
    /// Depth of `export_data` calls on this thread.
    static EXPORTING: Cell<usize> = const { Cell::new(0) };
}

struct ExportScope;

impl ExportScope {
    fn enter() -> Self {
        EXPORTING.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for ExportScope {
    fn drop(&mut self) {
        EXPORTING.with(|depth| depth.set(depth.get() - 1));
    }
}

enum Gate {
    Open(Database),
    ShuttingDown,
}

pub struct TransactionCoordinator {
    gate: RwLock<Gate>,
}

impl TransactionCoordinator {
    pub fn new(database: Database) -> Self {
        Self {
            gate: RwLock::new(Gate::Open(database)),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Shared access to the open store.
    ///
    /// Queues behind a waiting `shutdown`, except on a thread already
    /// inside `export_data`, where waiting would deadlock the exporter.
    fn enter(&self) -> Result<MappedRwLockReadGuard<'_, Database>> {
        let gate = if EXPORTING.with(Cell::get) > 0 {
            self.gate.read_recursive()
        } else {
            self.gate.read()
        };
        RwLockReadGuard::try_map(gate, |gate| match gate {
            Gate::Open(database) => Some(database),
            Gate::ShuttingDown => None,
        })
        .map_err(|_| Error::ShuttingDown)
    }

    /// Run `work` in one unit of work: commit on success, roll back on error.
    fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T>,
    {
        let database = self.enter()?;
        let mut conn = database.lock();
        let mut uow = UnitOfWork::new(conn.transaction()?);
        debug!("Unit of work started");

        match work(&mut uow) {
            Ok(value) => {
                uow.commit()?;
                debug!("Unit of work committed");
                Ok(value)
            }
            Err(e) => {
                drop(uow);
                warn!("Unit of work rolled back: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(*self.gate.read_recursive(), Gate::ShuttingDown)
    }

    /// Close the gate and release the store.
    ///
    /// Blocks until in-flight operations finish. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        let mut gate = self.gate.write();
        match std::mem::replace(&mut *gate, Gate::ShuttingDown) {
            Gate::Open(database) => {
                info!("Shutting down transaction coordinator");
                database.close()
            }
            Gate::ShuttingDown => Ok(()),
        }
    }

    // Creation

    pub fn create_task(&self) -> Result<Task> {
        self.run(|uow| uow.create_task())
    }

    pub fn create_time_segment(&self, parent: TaskId) -> Result<TimeSegment> {
        self.run(|uow| uow.create_time_segment(parent))
    }

    pub fn create_custom_field(&self) -> Result<CustomField> {
        self.run(|uow| uow.create_custom_field())
    }

    pub fn create_filter_date(&self, date_type: DateType) -> Result<Filter> {
        self.run(|uow| {
            uow.create_filter(FilterKind::Date {
                date_type,
                value: None,
            })
        })
    }

    pub fn create_filter_custom_field(&self, field: CustomFieldId) -> Result<Filter> {
        self.run(|uow| {
            if uow.find_custom_field(field)?.is_none() {
                return Err(Error::NotFound(format!("Custom field {}", field)));
            }
            uow.create_filter(FilterKind::CustomField { field, value: None })
        })
    }

    pub fn create_filter_task_completed(&self) -> Result<Filter> {
        self.run(|uow| uow.create_filter(FilterKind::TaskCompleted { completed: false }))
    }

    // Writes

    /// Apply a caller mutation in one unit of work.
    pub fn perform_change<T, F>(&self, mutation: F) -> Result<T>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T>,
    {
        self.run(mutation)
    }

    /// Upsert a whole record.
    pub fn merge_entity<E: Mergeable>(&self, entity: &E) -> Result<()> {
        self.run(|uow| entity.merge(uow))
    }

    /// Delete a task and the segments it owns. Returns false if absent.
    pub fn delete_task(&self, id: TaskId) -> Result<bool> {
        self.run(|uow| uow.delete_task(id))
    }

    pub fn delete_custom_field(&self, id: CustomFieldId) -> Result<bool> {
        self.run(|uow| uow.delete_custom_field(id))
    }

    pub fn delete_filter(&self, id: FilterId) -> Result<bool> {
        self.run(|uow| uow.delete_filter(id))
    }

    /// Copy a task's name, description, completion flag and custom field
    /// values into a new task. Segments are not copied.
    pub fn duplicate_task(&self, id: TaskId) -> Result<Task> {
        self.run(|uow| {
            let source = uow.task(id)?;
            let mut copy = uow.create_task()?;
            copy.name = source.name.clone();
            copy.description = source.description.clone();
            copy.completed = source.completed;
            for (field, value) in source.custom_fields() {
                copy.set_custom_field(*field, Some(value.clone()));
            }
            uow.save_task(&copy)?;
            Ok(copy)
        })
    }

    // Reads

    /// All tasks, optionally restricted by every stored filter.
    pub fn get_all_tasks(&self, apply_filters: bool) -> Result<Vec<Task>> {
        self.run(|uow| {
            if !apply_filters {
                return uow.all_tasks();
            }
            let filters = FilterSet::new(uow.filters()?);
            let tasks = uow.tasks_matching(&filters.predicate())?;
            Ok(filters.apply_refinement(tasks))
        })
    }

    pub fn get_all_filters(&self) -> Result<Vec<Filter>> {
        self.run(|uow| uow.filters())
    }

    pub fn get_task_by_id(&self, id: TaskId) -> Result<Option<Task>> {
        self.run(|uow| uow.find_task(id))
    }

    pub fn get_time_segment_by_id(&self, id: SegmentId) -> Result<Option<TimeSegment>> {
        self.run(|uow| uow.find_time_segment(id))
    }

    /// All custom fields ordered by name.
    pub fn get_custom_fields(&self) -> Result<Vec<CustomField>> {
        self.run(|uow| uow.custom_fields())
    }

    /// Distinct assigned values for every custom field in use.
    pub fn get_all_custom_field_values(&self) -> Result<BTreeMap<CustomField, BTreeSet<String>>> {
        self.run(|uow| uow.custom_field_values())
    }

    pub fn get_configuration_element(&self, key: &str) -> Result<Option<ConfigurationElement>> {
        self.run(|uow| uow.find_configuration(key))
    }

    // Bulk operations

    /// Run an importer inside one unit of work. Any error discards the
    /// whole import.
    pub fn import_data<I: Importer + ?Sized>(&self, importer: &mut I) -> Result<()> {
        info!("Importing data");
        self.run(|uow| importer.import_data(uow))
    }

    /// Hand the coordinator to a read-only exporter, holding shared access
    /// until it returns.
    pub fn export_data<E: Exporter + ?Sized>(&self, exporter: &mut E) -> Result<()> {
        let _gate = self.enter()?;
        let _exporting = ExportScope::enter();
        info!("Exporting data");
        exporter.export_data(self)
    }

    /// Delete segments no task owns. Returns how many were removed.
    pub fn cleanup_orphans(&self) -> Result<usize> {
        let removed = self.run(|uow| {
            let reachable: HashSet<SegmentId> = uow
                .all_tasks()?
                .iter()
                .flat_map(|task| task.segments().iter().map(TimeSegment::id))
                .collect();

            let mut removed = 0;
            for id in uow.all_segment_ids()? {
                if !reachable.contains(&id) && uow.delete_time_segment(id)? {
                    removed += 1;
                }
            }
            Ok(removed)
        })?;

        if removed > 0 {
            info!("Removed {} orphaned time segments", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults() {
        let coordinator = TransactionCoordinator::open_in_memory().unwrap();

        let task = coordinator.create_task().unwrap();
        assert_eq!(task.name, "");
        assert!(!task.completed);

        let segment = coordinator.create_time_segment(task.id()).unwrap();
        assert_eq!(segment.owner(), task.id());
        assert_eq!(segment.start(), segment.end());

        let stored = coordinator.get_task_by_id(task.id()).unwrap().unwrap();
        assert_eq!(stored.segments(), &[segment]);
    }

    #[test]
    fn test_segment_requires_existing_owner() {
        let coordinator = TransactionCoordinator::open_in_memory().unwrap();
        let result = coordinator.create_time_segment(TaskId(42));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let coordinator = TransactionCoordinator::open_in_memory().unwrap();
        let first = coordinator.create_task().unwrap();
        assert!(coordinator.delete_task(first.id()).unwrap());

        let second = coordinator.create_task().unwrap();
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_failed_change_rolls_back() {
        let coordinator = TransactionCoordinator::open_in_memory().unwrap();
        let task = coordinator.create_task().unwrap();

        let result: Result<()> = coordinator.perform_change(|uow| {
            let mut task = uow.task(task.id())?;
            task.name = "renamed".to_string();
            uow.save_task(&task)?;
            Err(Error::Validation("rejected".to_string()))
        });
        assert!(result.is_err());

        let stored = coordinator.get_task_by_id(task.id()).unwrap().unwrap();
        assert_eq!(stored.name, "");
    }

    #[test]
    fn test_shutdown_closes_gate() {
        let coordinator = TransactionCoordinator::open_in_memory().unwrap();
        assert!(!coordinator.is_shutting_down());

        coordinator.shutdown().unwrap();
        assert!(coordinator.is_shutting_down());
        assert!(matches!(coordinator.create_task(), Err(Error::ShuttingDown)));
        assert!(matches!(
            coordinator.get_task_by_id(TaskId(1)),
            Err(Error::ShuttingDown)
        ));

        // Second shutdown is a no-op
        coordinator.shutdown().unwrap();
    }
}
