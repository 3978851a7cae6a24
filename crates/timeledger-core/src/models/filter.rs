//! Stored task filters

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::timestamp::{normalize, to_micros};
use super::{CustomFieldId, FilterId, Task};
use crate::query::Predicate;
use crate::Error;

/// Which end of a task's recorded time a date filter bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateType {
    /// Earliest segment start must be at or after the value
    StartOfRange,
    /// Latest segment end must be at or before the value
    EndOfRange,
}

impl DateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateType::StartOfRange => "start_of_range",
            DateType::EndOfRange => "end_of_range",
        }
    }
}

impl fmt::Display for DateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_of_range" => Ok(DateType::StartOfRange),
            "end_of_range" => Ok(DateType::EndOfRange),
            other => Err(Error::InvalidData(format!("Unknown date type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    Date {
        date_type: DateType,
        value: Option<DateTime<Utc>>,
    },
    CustomField {
        field: CustomFieldId,
        value: Option<String>,
    },
    TaskCompleted {
        completed: bool,
    },
}

impl FilterKind {
    /// Tag stored in the `filters.kind` column.
    pub fn tag(&self) -> &'static str {
        match self {
            FilterKind::Date { .. } => "date",
            FilterKind::CustomField { .. } => "custom_field",
            FilterKind::TaskCompleted { .. } => "task_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub(crate) id: FilterId,
    pub kind: FilterKind,
}

impl Filter {
    pub(crate) fn new(id: FilterId, kind: FilterKind) -> Self {
        let mut filter = Self { id, kind };
        filter.normalize();
        filter
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    /// The custom field this filter tests, if any.
    pub fn custom_field(&self) -> Option<CustomFieldId> {
        match self.kind {
            FilterKind::CustomField { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Set the bound of a date filter. No effect on other kinds.
    pub fn set_date_value(&mut self, value: Option<DateTime<Utc>>) {
        if let FilterKind::Date { value: ref mut v, .. } = self.kind {
            *v = value.map(normalize);
        }
    }

    /// Set the expected value of a custom field filter. No effect on other kinds.
    pub fn set_field_value(&mut self, value: Option<String>) {
        if let FilterKind::CustomField { value: ref mut v, .. } = self.kind {
            *v = value;
        }
    }

    /// Set the expected flag of a completion filter. No effect on other kinds.
    pub fn set_completed(&mut self, completed: bool) {
        if let FilterKind::TaskCompleted { completed: ref mut c } = self.kind {
            *c = completed;
        }
    }

    pub(crate) fn normalize(&mut self) {
        if let FilterKind::Date { ref mut value, .. } = self.kind {
            *value = value.map(normalize);
        }
    }

    /// Store-side predicate over a row of `tasks`.
    ///
    /// Blank custom field values and unset dates yield the trivial predicate;
    /// the former is handled by [`Filter::refine`] after loading.
    pub fn to_predicate(&self) -> Predicate {
        match &self.kind {
            FilterKind::Date { value: None, .. } => Predicate::always(),
            FilterKind::Date {
                date_type: DateType::StartOfRange,
                value: Some(value),
            } => Predicate::new(
                "(SELECT MIN(s.start_time) FROM time_segments s WHERE s.owner_id = tasks.id) >= ?",
                vec![Value::Integer(to_micros(*value))],
            ),
            FilterKind::Date {
                date_type: DateType::EndOfRange,
                value: Some(value),
            } => Predicate::new(
                "(SELECT MAX(s.end_time) FROM time_segments s WHERE s.owner_id = tasks.id) <= ?",
                vec![Value::Integer(to_micros(*value))],
            ),
            FilterKind::CustomField { field, value } => match value {
                Some(value) if !is_blank(value) => Predicate::new(
                    "EXISTS (SELECT 1 FROM task_custom_fields v \
                     WHERE v.task_id = tasks.id AND v.field_id = ? AND v.value = ?)",
                    vec![Value::Integer(field.value()), Value::Text(value.clone())],
                ),
                _ => Predicate::always(),
            },
            FilterKind::TaskCompleted { completed } => {
                Predicate::new("tasks.completed = ?", vec![Value::Integer(*completed as i64)])
            }
        }
    }

    /// Whether this filter has an in-memory half.
    pub fn needs_refinement(&self) -> bool {
        matches!(
            &self.kind,
            FilterKind::CustomField { value, .. } if value.as_deref().map_or(true, is_blank)
        )
    }

    /// In-memory test run after the store query.
    ///
    /// A blank custom field filter keeps only tasks whose value for the field
    /// is unset or blank; every other filter passes everything here.
    pub fn refine(&self, task: &Task) -> bool {
        match &self.kind {
            FilterKind::CustomField { field, .. } if self.needs_refinement() => {
                task.custom_field_is_blank(*field)
            }
            _ => true,
        }
    }

    /// Full in-memory evaluation of both halves against a loaded task.
    pub fn matches(&self, task: &Task) -> bool {
        let store_side = match &self.kind {
            FilterKind::Date { value: None, .. } => true,
            FilterKind::Date {
                date_type: DateType::StartOfRange,
                value: Some(value),
            } => task.earliest_start().is_some_and(|start| start >= *value),
            FilterKind::Date {
                date_type: DateType::EndOfRange,
                value: Some(value),
            } => task.latest_end().is_some_and(|end| end <= *value),
            FilterKind::CustomField { field, value } => match value {
                Some(value) if !is_blank(value) => task.custom_field(*field) == Some(value.as_str()),
                _ => true,
            },
            FilterKind::TaskCompleted { completed } => task.completed == *completed,
        };
        store_side && self.refine(task)
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
