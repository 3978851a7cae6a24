//! Import and export contracts

pub mod csv;
pub mod json;

pub use self::csv::CsvExporter;
pub use self::json::{JsonExporter, JsonImporter, Snapshot};

use crate::coordinator::TransactionCoordinator;
use crate::storage::UnitOfWork;
use crate::Result;

/// Writes records into an open unit of work.
///
/// Returning an error discards everything the importer wrote.
pub trait Importer {
    fn import_data(&mut self, uow: &mut UnitOfWork<'_>) -> Result<()>;
}

/// Reads records through the coordinator and serializes them elsewhere.
pub trait Exporter {
    fn export_data(&mut self, coordinator: &TransactionCoordinator) -> Result<()>;
}
