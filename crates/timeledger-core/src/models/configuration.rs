//! Persisted key/value preferences

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// One stored preference. The key is the identity; merging overwrites.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigurationElement {
    pub key: String,
    pub value: Value,
}

impl ConfigurationElement {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Build an element from any serializable value.
    pub fn from_value<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(key, serde_json::to_value(value)?))
    }

    /// Decode the stored value into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_value_roundtrip() {
        let element =
            ConfigurationElement::from_value("last_directory", &PathBuf::from("/tmp/x")).unwrap();
        assert_eq!(element.key, "last_directory");

        let path: PathBuf = element.decode().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_decode_wrong_type() {
        let element = ConfigurationElement::new("count", Value::String("x".to_string()));
        assert!(element.decode::<u32>().is_err());
    }
}
