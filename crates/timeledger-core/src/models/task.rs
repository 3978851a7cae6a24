//! Task data model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{CustomFieldId, SegmentId, TaskId, TimeSegment};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub(crate) id: TaskId,
    pub name: String,
    pub description: String,
    pub completed: bool,
    pub(crate) segments: Vec<TimeSegment>,
    pub(crate) custom_fields: BTreeMap<CustomFieldId, String>,
}

impl Task {
    /// An empty task as the store creates it.
    pub(crate) fn new(id: TaskId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            completed: false,
            segments: Vec::new(),
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Owned segments, ordered by start time.
    pub fn segments(&self) -> &[TimeSegment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&TimeSegment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    pub fn owns_segment(&self, id: SegmentId) -> bool {
        self.segment(id).is_some()
    }

    pub(crate) fn attach_segment(&mut self, segment: TimeSegment) {
        let position = self
            .segments
            .partition_point(|s| (s.start(), s.id()) <= (segment.start(), segment.id()));
        self.segments.insert(position, segment);
    }

    /// Value assigned to a custom field, if any.
    pub fn custom_field(&self, field: CustomFieldId) -> Option<&str> {
        self.custom_fields.get(&field).map(String::as_str)
    }

    pub fn custom_fields(&self) -> &BTreeMap<CustomFieldId, String> {
        &self.custom_fields
    }

    /// Assign a custom field value; `None` removes the assignment.
    pub fn set_custom_field(&mut self, field: CustomFieldId, value: Option<String>) {
        match value {
            Some(value) => {
                self.custom_fields.insert(field, value);
            }
            None => {
                self.custom_fields.remove(&field);
            }
        }
    }

    /// True when the field is unset or holds only whitespace.
    pub fn custom_field_is_blank(&self, field: CustomFieldId) -> bool {
        self.custom_field(field).map_or(true, |v| v.trim().is_empty())
    }

    pub fn total_duration(&self) -> Duration {
        self.segments
            .iter()
            .fold(Duration::zero(), |total, s| total + s.duration())
    }

    /// Total time spent inside `[clip_start, clip_end]`.
    pub fn total_duration_clipped(
        &self,
        clip_start: DateTime<Utc>,
        clip_end: DateTime<Utc>,
    ) -> Duration {
        self.segments.iter().fold(Duration::zero(), |total, s| {
            total + s.clipped_duration(clip_start, clip_end)
        })
    }

    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.segments.iter().map(TimeSegment::start).min()
    }

    pub fn latest_end(&self) -> Option<DateTime<Utc>> {
        self.segments.iter().map(TimeSegment::end).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap()
    }

    fn task_with_segments() -> Task {
        let mut task = Task::new(TaskId(1));
        task.attach_segment(TimeSegment::from_parts(
            SegmentId(2),
            TaskId(1),
            at(13),
            at(15),
            String::new(),
        ));
        task.attach_segment(TimeSegment::from_parts(
            SegmentId(1),
            TaskId(1),
            at(9),
            at(10),
            String::new(),
        ));
        task
    }

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new(TaskId(3));
        assert_eq!(task.id(), TaskId(3));
        assert_eq!(task.name, "");
        assert_eq!(task.description, "");
        assert!(!task.completed);
        assert!(task.segments().is_empty());
        assert_eq!(task.total_duration(), Duration::zero());
    }

    #[test]
    fn test_segments_kept_in_start_order() {
        let task = task_with_segments();
        let ids: Vec<_> = task.segments().iter().map(TimeSegment::id).collect();
        assert_eq!(ids, vec![SegmentId(1), SegmentId(2)]);
        assert_eq!(task.earliest_start(), Some(at(9)));
        assert_eq!(task.latest_end(), Some(at(15)));
    }

    #[test]
    fn test_total_duration() {
        let task = task_with_segments();
        assert_eq!(task.total_duration(), Duration::hours(3));
        assert_eq!(task.total_duration_clipped(at(9), at(14)), Duration::hours(2));
        assert_eq!(task.total_duration_clipped(at(16), at(18)), Duration::zero());
    }

    #[test]
    fn test_custom_fields() {
        let mut task = Task::new(TaskId(1));
        let field = CustomFieldId(5);
        assert!(task.custom_field_is_blank(field));

        task.set_custom_field(field, Some("  ".to_string()));
        assert!(task.custom_field_is_blank(field));

        task.set_custom_field(field, Some("acme".to_string()));
        assert_eq!(task.custom_field(field), Some("acme"));
        assert!(!task.custom_field_is_blank(field));

        task.set_custom_field(field, None);
        assert_eq!(task.custom_field(field), None);
    }
}
