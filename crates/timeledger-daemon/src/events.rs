use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timeledger_core::models::{SegmentId, Task, TaskId};

use crate::sync::SegmentView;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum DaemonEvent {
    Task(TaskEvent),
    Segment(SegmentEvent),
    Timing(TimingEvent),
    Total(TotalEvent),
    Background(BackgroundEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_type: TaskEventType,
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    Created,
    Updated,
    Deleted,
}

impl TaskEvent {
    pub fn created(task: Task) -> Self {
        Self {
            event_type: TaskEventType::Created,
            task_id: task.id(),
            task: Some(task),
            timestamp: Utc::now(),
        }
    }

    pub fn updated(task: Task) -> Self {
        Self {
            event_type: TaskEventType::Updated,
            task_id: task.id(),
            task: Some(task),
            timestamp: Utc::now(),
        }
    }

    pub fn deleted(task_id: TaskId) -> Self {
        Self {
            event_type: TaskEventType::Deleted,
            task_id,
            task: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentEvent {
    pub event_type: SegmentEventType,
    pub segment_id: SegmentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<SegmentView>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentEventType {
    Created,
    Updated,
    Deleted,
}

impl SegmentEvent {
    pub fn created(segment: SegmentView) -> Self {
        Self {
            event_type: SegmentEventType::Created,
            segment_id: segment.id,
            segment: Some(segment),
            timestamp: Utc::now(),
        }
    }

    pub fn updated(segment: SegmentView) -> Self {
        Self {
            event_type: SegmentEventType::Updated,
            segment_id: segment.id,
            segment: Some(segment),
            timestamp: Utc::now(),
        }
    }

    pub fn deleted(segment_id: SegmentId) -> Self {
        Self {
            event_type: SegmentEventType::Deleted,
            segment_id,
            segment: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingEvent {
    pub event_type: TimingEventType,
    pub segment_id: SegmentId,
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimingEventType {
    Started,
    Stopped { end: DateTime<Utc> },
}

impl TimingEvent {
    pub fn started(segment_id: SegmentId, task_id: TaskId) -> Self {
        Self {
            event_type: TimingEventType::Started,
            segment_id,
            task_id,
            timestamp: Utc::now(),
        }
    }

    pub fn stopped(segment_id: SegmentId, task_id: TaskId, end: DateTime<Utc>) -> Self {
        Self {
            event_type: TimingEventType::Stopped { end },
            segment_id,
            task_id,
            timestamp: Utc::now(),
        }
    }
}

/// New value of the filtered total time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TotalEvent {
    pub total_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

impl TotalEvent {
    pub fn new(total_seconds: i64) -> Self {
        Self {
            total_seconds,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackgroundEvent {
    pub event_type: BackgroundEventType,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundEventType {
    Started,
    Finished,
    Failed { error: String },
}

impl BackgroundEvent {
    pub fn new(event_type: BackgroundEventType, name: impl Into<String>) -> Self {
        Self {
            event_type,
            name: name.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn started(name: impl Into<String>) -> Self {
        Self::new(BackgroundEventType::Started, name)
    }

    pub fn finished(name: impl Into<String>) -> Self {
        Self::new(BackgroundEventType::Finished, name)
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(BackgroundEventType::Failed { error }, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_event_serialization() {
        let event = TaskEvent::deleted(TaskId(4));
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("\"task\""));

        let deserialized: TaskEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.task_id, TaskId(4));
        assert_eq!(deserialized.event_type, TaskEventType::Deleted);
    }

    #[test]
    fn test_timing_event_serialization() {
        let end = Utc::now();
        let event = DaemonEvent::Timing(TimingEvent::stopped(SegmentId(2), TaskId(1), end));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"category\":\"timing\""));
        assert!(json.contains("\"type\":\"stopped\""));

        let deserialized: DaemonEvent = serde_json::from_str(&json).unwrap();
        match deserialized {
            DaemonEvent::Timing(timing) => {
                assert_eq!(timing.event_type, TimingEventType::Stopped { end })
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_background_event_serialization() {
        let event = BackgroundEvent::failed("export".to_string(), "disk full".to_string());
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: BackgroundEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
