//! File-backed store: one pretty-printed JSON file per key

use super::{Store, StoreError};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Store persisting each key as `<base>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `base_path`
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        tracing::info!(path = %base_path.display(), "File store opened");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                reason: "keys may only contain ASCII letters, digits, '_' and '-'".to_string(),
            });
        }
        Ok(self.base_path.join(format!("{key}.json")))
    }
}

impl Store for FileStore {
    fn get_raw(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.key_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)?;
        let value = serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn set_raw(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        let json = serde_json::to_string_pretty(&value)?;

        // Write atomically: tmp + rename
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;

        tracing::debug!(key, path = %path.display(), "Store value written");
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
