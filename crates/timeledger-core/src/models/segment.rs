//! Time segment data model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::{self, normalize};
use super::{SegmentId, TaskId};

/// A time interval spent on exactly one task.
///
/// `start <= end` always holds; the setters adjust the other bound instead of
/// rejecting input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSegment {
    pub(crate) id: SegmentId,
    pub(crate) owner: TaskId,
    pub(crate) start: DateTime<Utc>,
    pub(crate) end: DateTime<Utc>,
    pub(crate) description: String,
}

impl TimeSegment {
    /// A zero-length segment at `at`, not yet persisted.
    pub(crate) fn new(id: SegmentId, owner: TaskId, at: DateTime<Utc>) -> Self {
        let at = normalize(at);
        Self {
            id,
            owner,
            start: at,
            end: at,
            description: String::new(),
        }
    }

    pub(crate) fn from_parts(
        id: SegmentId,
        owner: TaskId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        description: String,
    ) -> Self {
        let mut segment = Self::new(id, owner, start);
        segment.description = description;
        segment.set_start_end(start, end);
        segment
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn owner(&self) -> TaskId {
        self.owner
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_owner(&mut self, owner: TaskId) {
        self.owner = owner;
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Move the start; an end earlier than the new start follows it.
    pub fn set_start(&mut self, start: DateTime<Utc>) {
        self.start = normalize(start);
        if self.end < self.start {
            self.end = self.start;
        }
    }

    /// Move the end; a start later than the new end follows it.
    pub fn set_end(&mut self, end: DateTime<Utc>) {
        self.end = normalize(end);
        if self.start > self.end {
            self.start = self.end;
        }
    }

    /// Set both bounds at once. An end before the start collapses to the start.
    pub fn set_start_end(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.start = normalize(start);
        self.end = normalize(end).max(self.start);
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Overlap between this segment and `[clip_start, clip_end]`, zero if disjoint.
    pub fn clipped_duration(&self, clip_start: DateTime<Utc>, clip_end: DateTime<Utc>) -> Duration {
        let start = self.start.max(clip_start);
        let end = self.end.min(clip_end);
        if end > start {
            end - start
        } else {
            Duration::zero()
        }
    }

    pub fn duration_formatted(&self) -> String {
        timestamp::format_duration(self.duration())
    }
}
