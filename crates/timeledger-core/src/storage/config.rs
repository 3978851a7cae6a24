//! Configuration file storage

use crate::{models::Config, Result};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.json";

pub struct ConfigStorage {
    config_dir: PathBuf,
}

impl ConfigStorage {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load the configuration, writing the defaults on first use.
    pub fn load(&self) -> Result<Config> {
        let config_path = self.path();

        if !config_path.exists() {
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;

        // Treat an empty file like a missing one
        if content.trim().is_empty() {
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;
        std::fs::create_dir_all(&self.config_dir)?;

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.path(), content)?;

        Ok(())
    }
}

/// Database file a configuration points at, defaulting into `data_dir`.
pub fn database_path(config: &Config, data_dir: &Path) -> PathBuf {
    config
        .store
        .database_path
        .clone()
        .unwrap_or_else(|| data_dir.join(super::DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_creates_default() {
        let dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(dir.path().to_path_buf());

        let config = storage.load().unwrap();
        assert_eq!(config, Config::default());
        assert!(storage.path().exists());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(dir.path().to_path_buf());

        let mut config = Config::default();
        config.timing.tick_interval_ms = 250;
        config.timing.min_tick_spacing_ms = 100;
        config.store.database_path = Some(dir.path().join("custom.db"));
        storage.save(&config).unwrap();

        assert_eq!(storage.load().unwrap(), config);
        assert_eq!(
            database_path(&config, dir.path()),
            dir.path().join("custom.db")
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(dir.path().to_path_buf());
        std::fs::write(
            storage.path(),
            r#"{"version":"1.0.0","store":{"database_path":null},
               "timing":{"tick_interval_ms":0,"min_tick_spacing_ms":0},
               "daemon":{"log_level":"info"}}"#,
        )
        .unwrap();

        assert!(storage.load().is_err());
    }

    #[test]
    fn test_default_database_path() {
        let config = Config::default();
        assert_eq!(
            database_path(&config, Path::new("/data")),
            Path::new("/data").join("timeledger.db")
        );
    }
}
