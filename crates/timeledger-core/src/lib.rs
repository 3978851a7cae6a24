pub mod coordinator;
pub mod error;
pub mod models;
pub mod query;
pub mod storage;
pub mod transfer;

pub use coordinator::TransactionCoordinator;
pub use error::{Error, Result};
