//! In-transaction access to the record store
//!
//! A [`UnitOfWork`] wraps one SQLite transaction. It is only handed out by the
//! coordinator, which commits it when the caller succeeds; dropping it without
//! a commit rolls every statement back.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, Transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::timestamp::{self, from_micros, to_micros};
use crate::models::{
    ConfigurationElement, CustomField, CustomFieldId, DateType, Filter, FilterId, FilterKind,
    SegmentId, Task, TaskId, TimeSegment,
};
use crate::query::Predicate;
use crate::{Error, Result};

const SELECT_TASKS: &str = "SELECT tasks.id, tasks.name, tasks.description, tasks.completed FROM tasks";
const INSERT_TASK: &str = "INSERT INTO tasks DEFAULT VALUES";
const UPSERT_TASK: &str = "INSERT INTO tasks (id, name, description, completed) VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(id) DO UPDATE SET name = excluded.name, description = excluded.description, completed = excluded.completed";
const DELETE_TASK: &str = "DELETE FROM tasks WHERE id = ?1";
const TASK_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)";

const SELECT_SEGMENTS: &str =
    "SELECT id, owner_id, start_time, end_time, description FROM time_segments";
const INSERT_SEGMENT: &str =
    "INSERT INTO time_segments (owner_id, start_time, end_time, description) VALUES (?1, ?2, ?3, ?4)";
const UPSERT_SEGMENT: &str = "INSERT INTO time_segments (id, owner_id, start_time, end_time, description) VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, start_time = excluded.start_time,
    end_time = excluded.end_time, description = excluded.description";
const DELETE_SEGMENT: &str = "DELETE FROM time_segments WHERE id = ?1";
const DELETE_OWNED_SEGMENTS: &str = "DELETE FROM time_segments WHERE owner_id = ?1";

const SELECT_CUSTOM_FIELDS: &str = "SELECT id, name FROM custom_fields";
const INSERT_CUSTOM_FIELD: &str = "INSERT INTO custom_fields DEFAULT VALUES";
const UPSERT_CUSTOM_FIELD: &str = "INSERT INTO custom_fields (id, name) VALUES (?1, ?2)
    ON CONFLICT(id) DO UPDATE SET name = excluded.name";
const DELETE_CUSTOM_FIELD: &str = "DELETE FROM custom_fields WHERE id = ?1";

const SELECT_FIELD_VALUES: &str = "SELECT task_id, field_id, value FROM task_custom_fields";
const DELETE_TASK_FIELD_VALUES: &str = "DELETE FROM task_custom_fields WHERE task_id = ?1";
const DELETE_FIELD_VALUE: &str =
    "DELETE FROM task_custom_fields WHERE task_id = ?1 AND field_id = ?2";
const UPSERT_FIELD_VALUE: &str = "INSERT INTO task_custom_fields (task_id, field_id, value) VALUES (?1, ?2, ?3)
    ON CONFLICT(task_id, field_id) DO UPDATE SET value = excluded.value";
const SELECT_DISTINCT_FIELD_VALUES: &str = "SELECT DISTINCT f.id, f.name, v.value
    FROM task_custom_fields v JOIN custom_fields f ON f.id = v.field_id
    ORDER BY f.name, f.id, v.value";

const SELECT_FILTERS: &str =
    "SELECT id, kind, date_type, date_value, field_id, field_value, completed FROM filters";
const INSERT_FILTER: &str = "INSERT INTO filters (kind, date_type, date_value, field_id, field_value, completed)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const UPSERT_FILTER: &str = "INSERT INTO filters (id, kind, date_type, date_value, field_id, field_value, completed)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, date_type = excluded.date_type,
    date_value = excluded.date_value, field_id = excluded.field_id,
    field_value = excluded.field_value, completed = excluded.completed";
const DELETE_FILTER: &str = "DELETE FROM filters WHERE id = ?1";

const SELECT_CONFIGURATION: &str = "SELECT key, value FROM configuration WHERE key = ?1";
const UPSERT_CONFIGURATION: &str = "INSERT INTO configuration (key, value) VALUES (?1, ?2)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value";

/// Segment and custom value queries for the tasks a predicate selects.
fn child_queries(predicate: &Predicate) -> (String, String) {
    let selected = format!("SELECT tasks.id FROM tasks WHERE {}", predicate.sql());
    (
        format!(
            "{} WHERE owner_id IN ({}) ORDER BY start_time, id",
            SELECT_SEGMENTS, selected
        ),
        format!("{} WHERE task_id IN ({})", SELECT_FIELD_VALUES, selected),
    )
}

/// A record type that can be written whole, replacing any stored version.
pub trait Mergeable {
    fn merge(&self, uow: &UnitOfWork<'_>) -> Result<()>;
}

pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    // Tasks

    /// Insert an empty task.
    pub fn create_task(&self) -> Result<Task> {
        self.tx.execute(INSERT_TASK, [])?;
        Ok(Task::new(TaskId(self.tx.last_insert_rowid())))
    }

    pub fn task_exists(&self, id: TaskId) -> Result<bool> {
        Ok(self.tx.query_row(TASK_EXISTS, [id], |row| row.get(0))?)
    }

    /// Load a task with its segments and custom field values.
    pub fn find_task(&self, id: TaskId) -> Result<Option<Task>> {
        let predicate = Predicate::new("tasks.id = ?", vec![Value::Integer(id.value())]);
        Ok(self.tasks_matching(&predicate)?.into_iter().next())
    }

    /// Like [`UnitOfWork::find_task`], but a missing task is an error.
    pub fn task(&self, id: TaskId) -> Result<Task> {
        self.find_task(id)?
            .ok_or_else(|| Error::NotFound(format!("Task {}", id)))
    }

    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        self.tasks_matching(&Predicate::always())
    }

    /// Tasks admitted by a store-side predicate, ordered by id.
    pub fn tasks_matching(&self, predicate: &Predicate) -> Result<Vec<Task>> {
        let sql = format!("{} WHERE {} ORDER BY tasks.id", SELECT_TASKS, predicate.sql());
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(predicate.params()), task_from_row)?;
        let mut tasks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        self.attach_children(&mut tasks, predicate)?;
        Ok(tasks)
    }

    /// Load segments and custom values for the tasks selected by
    /// `predicate`. Child rows are restricted by the same predicate, so a
    /// point lookup only reads its own task's rows.
    fn attach_children(&self, tasks: &mut [Task], predicate: &Predicate) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let index: HashMap<TaskId, usize> =
            tasks.iter().enumerate().map(|(i, t)| (t.id(), i)).collect();
        let (segments_sql, values_sql) = child_queries(predicate);

        for segment in self.query_segments(&segments_sql, params_from_iter(predicate.params()))? {
            if let Some(&i) = index.get(&segment.owner()) {
                tasks[i].attach_segment(segment);
            }
        }

        let mut stmt = self.tx.prepare(&values_sql)?;
        let rows = stmt.query_map(params_from_iter(predicate.params()), |row| {
            Ok((
                row.get::<_, TaskId>(0)?,
                row.get::<_, CustomFieldId>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (task, field, value) = row?;
            if let Some(&i) = index.get(&task) {
                tasks[i].set_custom_field(field, Some(value));
            }
        }
        Ok(())
    }

    /// Write a task's own columns and custom field values. Segments are
    /// saved separately.
    pub fn save_task(&self, task: &Task) -> Result<()> {
        self.tx.execute(
            UPSERT_TASK,
            params![task.id(), task.name, task.description, task.completed],
        )?;
        self.tx.execute(DELETE_TASK_FIELD_VALUES, [task.id()])?;
        for (field, value) in task.custom_fields() {
            self.tx
                .execute(UPSERT_FIELD_VALUE, params![task.id(), field, value])?;
        }
        Ok(())
    }

    /// Assign or clear one custom field value.
    pub fn set_custom_field_value(
        &self,
        task: TaskId,
        field: CustomFieldId,
        value: Option<&str>,
    ) -> Result<()> {
        match value {
            Some(value) => self
                .tx
                .execute(UPSERT_FIELD_VALUE, params![task, field, value])?,
            None => self.tx.execute(DELETE_FIELD_VALUE, params![task, field])?,
        };
        Ok(())
    }

    /// Delete a task and every segment it owns. Returns false if absent.
    pub fn delete_task(&self, id: TaskId) -> Result<bool> {
        let segments = self.tx.execute(DELETE_OWNED_SEGMENTS, [id])?;
        let deleted = self.tx.execute(DELETE_TASK, [id])? > 0;
        if deleted {
            tracing::debug!("Deleted task {} with {} segments", id, segments);
        }
        Ok(deleted)
    }

    // Segments

    /// Insert a zero-length segment at the current instant.
    pub fn create_time_segment(&self, owner: TaskId) -> Result<TimeSegment> {
        if !self.task_exists(owner)? {
            return Err(Error::NotFound(format!("Task {}", owner)));
        }
        let now = timestamp::now();
        self.tx.execute(
            INSERT_SEGMENT,
            params![owner, to_micros(now), to_micros(now), ""],
        )?;
        Ok(TimeSegment::new(
            SegmentId(self.tx.last_insert_rowid()),
            owner,
            now,
        ))
    }

    pub fn find_time_segment(&self, id: SegmentId) -> Result<Option<TimeSegment>> {
        let sql = format!("{} WHERE id = ?1 AND owner_id IS NOT NULL", SELECT_SEGMENTS);
        Ok(self.query_segments(&sql, [id])?.into_iter().next())
    }

    pub fn time_segment(&self, id: SegmentId) -> Result<TimeSegment> {
        self.find_time_segment(id)?
            .ok_or_else(|| Error::NotFound(format!("Time segment {}", id)))
    }

    /// Write a segment. Its owner must exist.
    pub fn save_time_segment(&self, segment: &TimeSegment) -> Result<()> {
        if !self.task_exists(segment.owner())? {
            return Err(Error::NotFound(format!("Task {}", segment.owner())));
        }
        self.tx.execute(
            UPSERT_SEGMENT,
            params![
                segment.id(),
                segment.owner(),
                to_micros(segment.start()),
                to_micros(segment.end()),
                segment.description()
            ],
        )?;
        Ok(())
    }

    pub fn delete_time_segment(&self, id: SegmentId) -> Result<bool> {
        Ok(self.tx.execute(DELETE_SEGMENT, [id])? > 0)
    }

    /// Every stored segment id, owned or not.
    pub fn all_segment_ids(&self) -> Result<Vec<SegmentId>> {
        let mut stmt = self.tx.prepare("SELECT id FROM time_segments ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn query_segments<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<TimeSegment>> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, SegmentId>(0)?,
                row.get::<_, TaskId>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut segments = Vec::new();
        for row in rows {
            let (id, owner, start, end, description) = row?;
            segments.push(TimeSegment::from_parts(
                id,
                owner,
                from_micros(start)?,
                from_micros(end)?,
                description,
            ));
        }
        Ok(segments)
    }

    // Custom fields

    pub fn create_custom_field(&self) -> Result<CustomField> {
        self.tx.execute(INSERT_CUSTOM_FIELD, [])?;
        Ok(CustomField::new(CustomFieldId(self.tx.last_insert_rowid())))
    }

    pub fn find_custom_field(&self, id: CustomFieldId) -> Result<Option<CustomField>> {
        let sql = format!("{} WHERE id = ?1", SELECT_CUSTOM_FIELDS);
        Ok(self
            .tx
            .query_row(&sql, [id], |row| {
                Ok(CustomField::with_name(row.get(0)?, row.get(1)?))
            })
            .optional()?)
    }

    /// All custom fields ordered by name.
    pub fn custom_fields(&self) -> Result<Vec<CustomField>> {
        let sql = format!("{} ORDER BY name, id", SELECT_CUSTOM_FIELDS);
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(CustomField::with_name(row.get(0)?, row.get(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn save_custom_field(&self, field: &CustomField) -> Result<()> {
        self.tx
            .execute(UPSERT_CUSTOM_FIELD, params![field.id(), field.name])?;
        Ok(())
    }

    /// Delete a field together with its task values and the filters using it.
    pub fn delete_custom_field(&self, id: CustomFieldId) -> Result<bool> {
        Ok(self.tx.execute(DELETE_CUSTOM_FIELD, [id])? > 0)
    }

    /// Distinct values per field, for fields that at least one task uses.
    pub fn custom_field_values(&self) -> Result<BTreeMap<CustomField, BTreeSet<String>>> {
        let mut stmt = self.tx.prepare(SELECT_DISTINCT_FIELD_VALUES)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                CustomField::with_name(row.get(0)?, row.get(1)?),
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut values: BTreeMap<CustomField, BTreeSet<String>> = BTreeMap::new();
        for row in rows {
            let (field, value) = row?;
            values.entry(field).or_default().insert(value);
        }
        Ok(values)
    }

    // Filters

    pub fn create_filter(&self, kind: FilterKind) -> Result<Filter> {
        let columns = FilterColumns::from(&kind);
        self.tx.execute(
            INSERT_FILTER,
            params![
                kind.tag(),
                columns.date_type,
                columns.date_value,
                columns.field_id,
                columns.field_value,
                columns.completed
            ],
        )?;
        Ok(Filter::new(FilterId(self.tx.last_insert_rowid()), kind))
    }

    pub fn find_filter(&self, id: FilterId) -> Result<Option<Filter>> {
        let sql = format!("{} WHERE id = ?1", SELECT_FILTERS);
        Ok(self.query_filters(&sql, [id])?.into_iter().next())
    }

    /// All filters ordered by id.
    pub fn filters(&self) -> Result<Vec<Filter>> {
        let sql = format!("{} ORDER BY id", SELECT_FILTERS);
        self.query_filters(&sql, [])
    }

    pub fn save_filter(&self, filter: &Filter) -> Result<()> {
        let columns = FilterColumns::from(&filter.kind);
        self.tx.execute(
            UPSERT_FILTER,
            params![
                filter.id(),
                filter.kind.tag(),
                columns.date_type,
                columns.date_value,
                columns.field_id,
                columns.field_value,
                columns.completed
            ],
        )?;
        Ok(())
    }

    pub fn delete_filter(&self, id: FilterId) -> Result<bool> {
        Ok(self.tx.execute(DELETE_FILTER, [id])? > 0)
    }

    fn query_filters<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Filter>> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt.query_map(params, FilterRow::from_row)?;
        let mut filters = Vec::new();
        for row in rows {
            filters.push(row?.into_filter()?);
        }
        Ok(filters)
    }

    // Configuration

    pub fn find_configuration(&self, key: &str) -> Result<Option<ConfigurationElement>> {
        let row = self
            .tx
            .query_row(SELECT_CONFIGURATION, [key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;

        match row {
            Some((key, value)) => Ok(Some(ConfigurationElement::new(
                key,
                serde_json::from_str(&value)?,
            ))),
            None => Ok(None),
        }
    }

    pub fn save_configuration(&self, element: &ConfigurationElement) -> Result<()> {
        let value = serde_json::to_string(&element.value)?;
        self.tx
            .execute(UPSERT_CONFIGURATION, params![element.key, value])?;
        Ok(())
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let mut task = Task::new(row.get(0)?);
    task.name = row.get(1)?;
    task.description = row.get(2)?;
    task.completed = row.get(3)?;
    Ok(task)
}

#[derive(Default)]
struct FilterColumns {
    date_type: Option<&'static str>,
    date_value: Option<i64>,
    field_id: Option<CustomFieldId>,
    field_value: Option<String>,
    completed: Option<bool>,
}

impl From<&FilterKind> for FilterColumns {
    fn from(kind: &FilterKind) -> Self {
        match kind {
            FilterKind::Date { date_type, value } => Self {
                date_type: Some(date_type.as_str()),
                date_value: value.map(to_micros),
                ..Self::default()
            },
            FilterKind::CustomField { field, value } => Self {
                field_id: Some(*field),
                field_value: value.clone(),
                ..Self::default()
            },
            FilterKind::TaskCompleted { completed } => Self {
                completed: Some(*completed),
                ..Self::default()
            },
        }
    }
}

struct FilterRow {
    id: FilterId,
    kind: String,
    date_type: Option<String>,
    date_value: Option<i64>,
    field_id: Option<CustomFieldId>,
    field_value: Option<String>,
    completed: Option<bool>,
}

impl FilterRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            date_type: row.get(2)?,
            date_value: row.get(3)?,
            field_id: row.get(4)?,
            field_value: row.get(5)?,
            completed: row.get(6)?,
        })
    }

    fn into_filter(self) -> Result<Filter> {
        let kind = match self.kind.as_str() {
            "date" => {
                let date_type: DateType = self
                    .date_type
                    .as_deref()
                    .ok_or_else(|| Error::InvalidData(format!("Filter {} has no date type", self.id)))?
                    .parse()?;
                FilterKind::Date {
                    date_type,
                    value: self.date_value.map(from_micros).transpose()?,
                }
            }
            "custom_field" => FilterKind::CustomField {
                field: self.field_id.ok_or_else(|| {
                    Error::InvalidData(format!("Filter {} has no custom field", self.id))
                })?,
                value: self.field_value,
            },
            "task_completed" => FilterKind::TaskCompleted {
                completed: self.completed.unwrap_or(false),
            },
            other => {
                return Err(Error::InvalidData(format!(
                    "Filter {} has unknown kind '{}'",
                    self.id, other
                )))
            }
        };
        Ok(Filter::new(self.id, kind))
    }
}

impl Mergeable for ConfigurationElement {
    fn merge(&self, uow: &UnitOfWork<'_>) -> Result<()> {
        uow.save_configuration(self)
    }
}

impl Mergeable for CustomField {
    fn merge(&self, uow: &UnitOfWork<'_>) -> Result<()> {
        uow.save_custom_field(self)
    }
}

impl Mergeable for Filter {
    fn merge(&self, uow: &UnitOfWork<'_>) -> Result<()> {
        uow.save_filter(self)
    }
}

impl Mergeable for TimeSegment {
    fn merge(&self, uow: &UnitOfWork<'_>) -> Result<()> {
        uow.save_time_segment(self)
    }
}

/// Writes the task row, its custom field values and each segment it holds.
/// Stored segments missing from the task are left alone.
impl Mergeable for Task {
    fn merge(&self, uow: &UnitOfWork<'_>) -> Result<()> {
        uow.save_task(self)?;
        for segment in self.segments() {
            let mut segment = segment.clone();
            segment.set_owner(self.id());
            uow.save_time_segment(&segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn plan(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> String {
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {}", sql)).unwrap();
        let rows = stmt
            .query_map(params_from_iter(params), |row| row.get::<_, String>(3))
            .unwrap();
        rows.collect::<rusqlite::Result<Vec<_>>>().unwrap().join("\n")
    }

    #[test]
    fn test_point_lookup_reads_only_its_children() {
        let database = Database::open_in_memory().unwrap();
        let conn = database.lock();
        let predicate = Predicate::new("tasks.id = ?", vec![Value::Integer(1)]);
        let (segments_sql, values_sql) = child_queries(&predicate);

        let segments = plan(&conn, &segments_sql, predicate.params());
        assert!(segments.contains("idx_time_segments_owner"), "{}", segments);
        assert!(!segments.contains("SCAN time_segments"), "{}", segments);

        let values = plan(&conn, &values_sql, predicate.params());
        assert!(!values.contains("SCAN task_custom_fields"), "{}", values);
    }

    #[test]
    fn test_children_follow_their_task() {
        let database = Database::open_in_memory().unwrap();
        let mut conn = database.lock();
        let uow = UnitOfWork::new(conn.transaction().unwrap());

        let field = uow.create_custom_field().unwrap();
        let mut tasks = Vec::new();
        for i in 0..5 {
            let mut task = uow.create_task().unwrap();
            task.set_custom_field(field.id(), Some(format!("client-{}", i)));
            uow.save_task(&task).unwrap();
            for _ in 0..=i {
                uow.create_time_segment(task.id()).unwrap();
            }
            tasks.push(task.id());
        }

        let third = uow.task(tasks[2]).unwrap();
        assert_eq!(third.segments().len(), 3);
        assert!(third.segments().iter().all(|s| s.owner() == tasks[2]));
        assert_eq!(third.custom_field(field.id()), Some("client-2"));

        let all = uow.all_tasks().unwrap();
        let counts: Vec<usize> = all.iter().map(|t| t.segments().len()).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    }
}
