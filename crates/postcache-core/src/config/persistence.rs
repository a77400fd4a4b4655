//! Named-record JSON file persistence
//!
//! The configuration lives as one named record inside a JSON object file, so
//! other records sharing the file are left alone when it is rewritten.

use crate::error::{PostcacheError, PostcacheResult};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and writes named records in `<data_dir>/config.json`
#[derive(Debug, Clone)]
pub struct ConfigPersistence {
    config_path: PathBuf,
}

impl ConfigPersistence {
    /// Create a new persistence manager for the given directory
    pub fn new(base_dir: &Path) -> Self {
        Self {
            config_path: base_dir.join("config.json"),
        }
    }

    /// Create persistence manager with the default data directory
    pub fn with_defaults() -> Self {
        Self::new(&super::default_data_dir())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load a named record; `None` when the file or the record does not exist
    pub fn load_record(&self, name: &str) -> PostcacheResult<Option<Value>> {
        let file = self.load_json_file()?;
        Ok(file.get(name).cloned())
    }

    /// Replace a named record, keeping every other record in the file
    pub fn save_record(&self, name: &str, value: Value) -> PostcacheResult<()> {
        let mut file = self.load_json_file()?;
        file.insert(name.to_string(), value);
        self.save_json_file(&file)
    }

    /// Remove a named record
    pub fn remove_record(&self, name: &str) -> PostcacheResult<()> {
        let mut file = self.load_json_file()?;
        if file.remove(name).is_some() {
            self.save_json_file(&file)?;
        }
        Ok(())
    }

    /// Load the JSON file, returning an empty object if it doesn't exist
    fn load_json_file(&self) -> PostcacheResult<Map<String, Value>> {
        let path = &self.config_path;
        if !path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            PostcacheError::io_with_path(
                format!("Failed to read config: {}", e),
                path.display().to_string(),
            )
        })?;

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(PostcacheError::config(format!(
                "{} does not contain a JSON object",
                path.display()
            ))),
            Err(e) => Err(PostcacheError::config(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Save the JSON file, creating parent directories if needed
    fn save_json_file(&self, map: &Map<String, Value>) -> PostcacheResult<()> {
        let path = &self.config_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PostcacheError::io(format!("Failed to create directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(map)
            .map_err(|e| PostcacheError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(|e| {
            PostcacheError::io_with_path(
                format!("Failed to write config: {}", e),
                path.display().to_string(),
            )
        })?;

        debug!("Saved configuration to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_has_no_record() {
        let dir = tempdir().unwrap();
        let persistence = ConfigPersistence::new(dir.path());
        assert_eq!(persistence.load_record("postcache_config").unwrap(), None);
    }

    #[test]
    fn test_save_and_load_record() {
        let dir = tempdir().unwrap();
        let persistence = ConfigPersistence::new(dir.path());

        persistence
            .save_record("postcache_config", json!({"pageSize": 60}))
            .unwrap();
        assert_eq!(
            persistence.load_record("postcache_config").unwrap(),
            Some(json!({"pageSize": 60}))
        );
    }

    #[test]
    fn test_other_records_survive_rewrite() {
        let dir = tempdir().unwrap();
        let persistence = ConfigPersistence::new(dir.path());

        persistence.save_record("other_feature", json!({"on": true})).unwrap();
        persistence.save_record("postcache_config", json!({})).unwrap();
        persistence.remove_record("postcache_config").unwrap();

        assert_eq!(
            persistence.load_record("other_feature").unwrap(),
            Some(json!({"on": true}))
        );
        assert_eq!(persistence.load_record("postcache_config").unwrap(), None);
    }

    #[test]
    fn test_garbage_file_is_config_error() {
        let dir = tempdir().unwrap();
        let persistence = ConfigPersistence::new(dir.path());
        fs::write(persistence.config_path(), "{ nope").unwrap();

        let err = persistence.load_record("postcache_config").unwrap_err();
        assert!(matches!(err, PostcacheError::Config { .. }));
    }
}
