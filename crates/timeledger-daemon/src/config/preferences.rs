//! Preferences stored alongside the data

use std::path::{Path, PathBuf};
use std::sync::Arc;
use timeledger_core::models::ConfigurationElement;
use timeledger_core::{Result, TransactionCoordinator};

const LAST_DIRECTORY: &str = "last_directory";

/// Small user settings kept as configuration records in the database, so
/// they travel with the data file rather than the config dir.
pub struct Preferences {
    coordinator: Arc<TransactionCoordinator>,
}

impl Preferences {
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Directory of the last file imported or exported.
    pub fn last_directory(&self) -> Result<Option<PathBuf>> {
        self.coordinator
            .get_configuration_element(LAST_DIRECTORY)?
            .map(|element| element.decode())
            .transpose()
    }

    pub fn set_last_directory(&self, dir: &Path) -> Result<()> {
        let element = ConfigurationElement::from_value(LAST_DIRECTORY, &dir)?;
        self.coordinator.merge_entity(&element)
    }

    /// Remember the directory holding `file`.
    pub fn remember_file(&self, file: &Path) -> Result<()> {
        match file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            Some(dir) => self.set_last_directory(dir),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_directory() {
        let coordinator = Arc::new(TransactionCoordinator::open_in_memory().unwrap());
        let preferences = Preferences::new(coordinator);
        assert_eq!(preferences.last_directory().unwrap(), None);

        preferences
            .remember_file(Path::new("/srv/reports/march.csv"))
            .unwrap();
        assert_eq!(
            preferences.last_directory().unwrap(),
            Some(PathBuf::from("/srv/reports"))
        );

        // Bare file names carry no directory
        preferences.remember_file(Path::new("april.csv")).unwrap();
        assert_eq!(
            preferences.last_directory().unwrap(),
            Some(PathBuf::from("/srv/reports"))
        );
    }
}
