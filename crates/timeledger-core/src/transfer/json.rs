//! Full JSON snapshots
//!
//! Custom fields are referenced by name so a snapshot can be loaded into a
//! store that already has its own ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use super::{Exporter, Importer};
use crate::coordinator::TransactionCoordinator;
use crate::models::{CustomFieldId, DateType, FilterKind};
use crate::storage::UnitOfWork;
use crate::{Error, Result};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub custom_fields: Vec<String>,
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub filters: Vec<FilterRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    /// Field name to value
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub segments: Vec<SegmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterRecord {
    Date {
        date_type: DateType,
        value: Option<DateTime<Utc>>,
    },
    CustomField {
        field: String,
        value: Option<String>,
    },
    TaskCompleted {
        completed: bool,
    },
}

impl Snapshot {
    /// Capture every task, custom field and filter.
    pub fn capture(coordinator: &TransactionCoordinator) -> Result<Self> {
        let fields = coordinator.get_custom_fields()?;
        let names: HashMap<CustomFieldId, String> =
            fields.iter().map(|f| (f.id(), f.name.clone())).collect();
        let field_name = |id: CustomFieldId| {
            names
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::InvalidData(format!("Unknown custom field {}", id)))
        };

        let mut tasks = Vec::new();
        for task in coordinator.get_all_tasks(false)? {
            let mut custom_fields = BTreeMap::new();
            for (field, value) in task.custom_fields() {
                custom_fields.insert(field_name(*field)?, value.clone());
            }
            tasks.push(TaskRecord {
                name: task.name.clone(),
                description: task.description.clone(),
                completed: task.completed,
                custom_fields,
                segments: task
                    .segments()
                    .iter()
                    .map(|s| SegmentRecord {
                        start: s.start(),
                        end: s.end(),
                        description: s.description().to_string(),
                    })
                    .collect(),
            });
        }

        let mut filters = Vec::new();
        for filter in coordinator.get_all_filters()? {
            filters.push(match filter.kind {
                FilterKind::Date { date_type, value } => FilterRecord::Date { date_type, value },
                FilterKind::CustomField { field, value } => FilterRecord::CustomField {
                    field: field_name(field)?,
                    value,
                },
                FilterKind::TaskCompleted { completed } => FilterRecord::TaskCompleted { completed },
            });
        }

        Ok(Self {
            version: SNAPSHOT_VERSION,
            exported_at: Utc::now(),
            custom_fields: fields.into_iter().map(|f| f.name).collect(),
            tasks,
            filters,
        })
    }

    /// Insert the snapshot's contents with fresh ids.
    pub fn restore(&self, uow: &UnitOfWork<'_>) -> Result<()> {
        if self.version > SNAPSHOT_VERSION {
            return Err(Error::InvalidData(format!(
                "Unsupported snapshot version {}",
                self.version
            )));
        }

        // Existing fields win; the first one of a repeated name is used
        let mut fields: HashMap<String, CustomFieldId> = HashMap::new();
        for field in uow.custom_fields()? {
            fields.entry(field.name.clone()).or_insert(field.id());
        }
        for name in &self.custom_fields {
            if !fields.contains_key(name) {
                let mut field = uow.create_custom_field()?;
                field.name = name.clone();
                uow.save_custom_field(&field)?;
                fields.insert(name.clone(), field.id());
            }
        }
        let field_id = |name: &str| {
            fields.get(name).copied().ok_or_else(|| {
                Error::InvalidData(format!("Reference to undeclared custom field '{}'", name))
            })
        };

        for record in &self.tasks {
            let mut task = uow.create_task()?;
            task.name = record.name.clone();
            task.description = record.description.clone();
            task.completed = record.completed;
            for (name, value) in &record.custom_fields {
                task.set_custom_field(field_id(name)?, Some(value.clone()));
            }
            uow.save_task(&task)?;

            for segment_record in &record.segments {
                let mut segment = uow.create_time_segment(task.id())?;
                segment.set_start_end(segment_record.start, segment_record.end);
                segment.set_description(segment_record.description.clone());
                uow.save_time_segment(&segment)?;
            }
        }

        for record in &self.filters {
            let kind = match record {
                FilterRecord::Date { date_type, value } => FilterKind::Date {
                    date_type: *date_type,
                    value: *value,
                },
                FilterRecord::CustomField { field, value } => FilterKind::CustomField {
                    field: field_id(field)?,
                    value: value.clone(),
                },
                FilterRecord::TaskCompleted { completed } => FilterKind::TaskCompleted {
                    completed: *completed,
                },
            };
            uow.create_filter(kind)?;
        }

        info!(
            "Restored {} tasks, {} filters",
            self.tasks.len(),
            self.filters.len()
        );
        Ok(())
    }
}

/// Writes a pretty-printed [`Snapshot`].
pub struct JsonExporter<W: Write> {
    writer: W,
}

impl JsonExporter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonExporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Exporter for JsonExporter<W> {
    fn export_data(&mut self, coordinator: &TransactionCoordinator) -> Result<()> {
        let snapshot = Snapshot::capture(coordinator)?;
        serde_json::to_writer_pretty(&mut self.writer, &snapshot)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads a [`Snapshot`] and restores it.
pub struct JsonImporter<R: Read> {
    reader: Option<R>,
}

impl JsonImporter<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> JsonImporter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R: Read> Importer for JsonImporter<R> {
    fn import_data(&mut self, uow: &mut UnitOfWork<'_>) -> Result<()> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| Error::InvalidData("Snapshot already imported".to_string()))?;
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        snapshot.restore(uow)
    }
}

impl Importer for Snapshot {
    fn import_data(&mut self, uow: &mut UnitOfWork<'_>) -> Result<()> {
        self.restore(uow)
    }
}
