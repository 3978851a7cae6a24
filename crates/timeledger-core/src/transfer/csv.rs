//! Per-segment CSV export

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::Exporter;
use crate::coordinator::TransactionCoordinator;
use crate::models::{Task, TimeSegment};
use crate::{Error, Result};

/// CSV-friendly representation of a segment
#[derive(Debug, Serialize)]
struct SegmentCsv {
    task_id: i64,
    task: String,
    description: String,
    start_time: String,
    end_time: String,
    duration_seconds: i64,
}

impl SegmentCsv {
    fn new(task: &Task, segment: &TimeSegment, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id().value(),
            task: task.name.clone(),
            description: segment.description().to_string(),
            start_time: start.to_rfc3339(),
            end_time: end.to_rfc3339(),
            duration_seconds: (end - start).num_seconds(),
        }
    }
}

/// One row per segment. With an interval set, segments are clipped to it and
/// those outside it are skipped.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    interval: Option<(DateTime<Utc>, DateTime<Utc>)>,
    apply_filters: bool,
}

impl CsvExporter<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> CsvExporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            interval: None,
            apply_filters: false,
        }
    }

    /// Restrict rows to `[start, end]`.
    pub fn with_interval(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::Validation(
                "Report interval ends before it starts".to_string(),
            ));
        }
        self.interval = Some((start, end));
        Ok(self)
    }

    /// Only export tasks admitted by the stored filters.
    pub fn with_filters(mut self, apply_filters: bool) -> Self {
        self.apply_filters = apply_filters;
        self
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }

    fn write_segment(&mut self, task: &Task, segment: &TimeSegment) -> Result<()> {
        let row = match self.interval {
            Some((clip_start, clip_end)) => {
                if segment.clipped_duration(clip_start, clip_end) == Duration::zero() {
                    return Ok(());
                }
                SegmentCsv::new(
                    task,
                    segment,
                    segment.start().max(clip_start),
                    segment.end().min(clip_end),
                )
            }
            None => SegmentCsv::new(task, segment, segment.start(), segment.end()),
        };
        self.writer.serialize(&row)?;
        Ok(())
    }
}

impl<W: Write> Exporter for CsvExporter<W> {
    fn export_data(&mut self, coordinator: &TransactionCoordinator) -> Result<()> {
        let tasks = coordinator.get_all_tasks(self.apply_filters)?;
        for task in &tasks {
            for segment in task.segments() {
                self.write_segment(task, segment)?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, hour, 0, 0).unwrap()
    }

    fn populated() -> TransactionCoordinator {
        let coordinator = TransactionCoordinator::open_in_memory().unwrap();
        let mut task = coordinator.create_task().unwrap();
        task.name = "Write, report".to_string();
        coordinator.merge_entity(&task).unwrap();

        for (start, end) in [(9, 11), (14, 15)] {
            let mut segment = coordinator.create_time_segment(task.id()).unwrap();
            segment.set_start_end(at(start), at(end));
            coordinator.merge_entity(&segment).unwrap();
        }
        coordinator
    }

    fn export(exporter: CsvExporter<Vec<u8>>, coordinator: &TransactionCoordinator) -> Vec<String> {
        let mut exporter = exporter;
        coordinator.export_data(&mut exporter).unwrap();
        let bytes = exporter.into_inner().unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_export_all_segments() {
        let coordinator = populated();
        let lines = export(CsvExporter::new(Vec::new()), &coordinator);

        assert_eq!(
            lines[0],
            "task_id,task,description,start_time,end_time,duration_seconds"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("\"Write, report\""));
        assert!(lines[1].ends_with(",7200"));
        assert!(lines[2].ends_with(",3600"));
    }

    #[test]
    fn test_export_clipped_interval() {
        let coordinator = populated();
        let exporter = CsvExporter::new(Vec::new())
            .with_interval(at(10), at(12))
            .unwrap();
        let lines = export(exporter, &coordinator);

        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(&at(10).to_rfc3339()));
        assert!(lines[1].ends_with(",3600"));
    }

    #[test]
    fn test_reversed_interval_rejected() {
        assert!(CsvExporter::new(Vec::new())
            .with_interval(at(12), at(10))
            .is_err());
    }
}
