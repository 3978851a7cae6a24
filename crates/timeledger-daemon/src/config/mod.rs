//! Daemon configuration and stored preferences

pub mod manager;
pub mod preferences;

pub use manager::{ConfigManager, ConfigManagerError};
pub use preferences::Preferences;
