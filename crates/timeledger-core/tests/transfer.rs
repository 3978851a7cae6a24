use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use timeledger_core::models::{DateType, FilterKind};
use timeledger_core::storage::UnitOfWork;
use timeledger_core::transfer::{Importer, JsonExporter, JsonImporter, Snapshot};
use timeledger_core::{Error, Result, TransactionCoordinator};

fn populated(dir: &TempDir) -> TransactionCoordinator {
    let coordinator = TransactionCoordinator::open(dir.path().join("source.db")).unwrap();

    let mut field = coordinator.create_custom_field().unwrap();
    field.name = "client".to_string();
    coordinator.merge_entity(&field).unwrap();

    let mut task = coordinator.create_task().unwrap();
    task.name = "Invoice".to_string();
    task.description = "March".to_string();
    task.set_custom_field(field.id(), Some("acme".to_string()));
    coordinator.merge_entity(&task).unwrap();

    let mut segment = coordinator.create_time_segment(task.id()).unwrap();
    segment.set_start_end(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap(),
    );
    segment.set_description("drafting");
    coordinator.merge_entity(&segment).unwrap();

    let mut filter = coordinator.create_filter_custom_field(field.id()).unwrap();
    filter.set_field_value(Some("acme".to_string()));
    coordinator.merge_entity(&filter).unwrap();
    let mut date = coordinator.create_filter_date(DateType::EndOfRange).unwrap();
    date.set_date_value(Some(Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap()));
    coordinator.merge_entity(&date).unwrap();

    coordinator
}

#[test]
fn test_json_export_import_preserves_data() {
    let dir = TempDir::new().unwrap();
    let source = populated(&dir);

    let mut exporter = JsonExporter::new(Vec::new());
    source.export_data(&mut exporter).unwrap();
    let json = exporter.into_inner();

    let target = TransactionCoordinator::open(dir.path().join("target.db")).unwrap();
    // A pre-existing field with the same name is reused
    let mut existing = target.create_custom_field().unwrap();
    existing.name = "client".to_string();
    target.merge_entity(&existing).unwrap();

    target
        .import_data(&mut JsonImporter::new(json.as_slice()))
        .unwrap();

    assert_eq!(target.get_custom_fields().unwrap().len(), 1);

    let tasks = target.get_all_tasks(false).unwrap();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.name, "Invoice");
    assert_eq!(task.description, "March");
    assert_eq!(task.custom_field(existing.id()), Some("acme"));

    let original = &source.get_all_tasks(false).unwrap()[0];
    assert_eq!(task.segments().len(), 1);
    assert_eq!(task.segments()[0].start(), original.segments()[0].start());
    assert_eq!(task.segments()[0].end(), original.segments()[0].end());
    assert_eq!(task.segments()[0].description(), "drafting");

    let filters = target.get_all_filters().unwrap();
    assert_eq!(filters.len(), 2);
    assert_eq!(
        filters[0].kind,
        FilterKind::CustomField {
            field: existing.id(),
            value: Some("acme".to_string())
        }
    );
    assert_eq!(target.get_all_tasks(true).unwrap().len(), 1);
}

#[test]
fn test_export_to_file() {
    let dir = TempDir::new().unwrap();
    let source = populated(&dir);
    let path = dir.path().join("export.json");

    let mut exporter = JsonExporter::create(&path).unwrap();
    source.export_data(&mut exporter).unwrap();
    drop(exporter);

    let snapshot: Snapshot =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(snapshot.custom_fields, vec!["client"]);
    assert_eq!(snapshot.tasks.len(), 1);
    assert_eq!(snapshot.filters.len(), 2);
}

#[test]
fn test_failed_import_rolls_back_everything() {
    let dir = TempDir::new().unwrap();
    let source = populated(&dir);
    let mut snapshot = Snapshot::capture(&source).unwrap();
    // Filter points at a field the snapshot never declares
    snapshot.custom_fields.clear();
    snapshot.tasks[0].custom_fields.clear();

    let target = TransactionCoordinator::open(dir.path().join("target.db")).unwrap();
    let result = target.import_data(&mut snapshot);
    assert!(matches!(result, Err(Error::InvalidData(_))));

    assert!(target.get_all_tasks(false).unwrap().is_empty());
    assert!(target.get_all_filters().unwrap().is_empty());
}

struct FailingImporter;

impl Importer for FailingImporter {
    fn import_data(&mut self, uow: &mut UnitOfWork<'_>) -> Result<()> {
        let task = uow.create_task()?;
        uow.create_time_segment(task.id())?;
        Err(Error::Validation("malformed input".to_string()))
    }
}

#[test]
fn test_importer_error_discards_partial_writes() {
    let dir = TempDir::new().unwrap();
    let coordinator = TransactionCoordinator::open(dir.path().join("db.sqlite")).unwrap();

    assert!(coordinator.import_data(&mut FailingImporter).is_err());
    assert!(coordinator.get_all_tasks(false).unwrap().is_empty());
    assert_eq!(coordinator.cleanup_orphans().unwrap(), 0);
}

#[test]
fn test_malformed_json_import() {
    let dir = TempDir::new().unwrap();
    let coordinator = TransactionCoordinator::open(dir.path().join("db.sqlite")).unwrap();

    let result = coordinator.import_data(&mut JsonImporter::new("{ not json".as_bytes()));
    assert!(matches!(result, Err(Error::Json(_))));
}
