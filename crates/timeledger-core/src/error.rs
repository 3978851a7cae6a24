//! Error type shared by every core operation

/// Core error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The coordinator gate is closed; no new work is accepted.
    #[error("Application is shutting down")]
    ShuttingDown,

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// True for the closed-gate condition, which teardown code may ignore.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Error::ShuttingDown)
    }

    /// True when the error means a unit of work failed and was rolled back.
    pub fn is_transaction_failure(&self) -> bool {
        !self.is_shutting_down()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutting_down_classification() {
        assert!(Error::ShuttingDown.is_shutting_down());
        assert!(!Error::ShuttingDown.is_transaction_failure());

        let err = Error::NotFound("task 1".to_string());
        assert!(!err.is_shutting_down());
        assert!(err.is_transaction_failure());
        assert_eq!(err.to_string(), "Record not found: task 1");
    }
}
