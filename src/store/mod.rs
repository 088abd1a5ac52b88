//! Key-value store accessor
//!
//! The dashboard keeps every collection as one JSON document under a string
//! key. The propagation engine only ever needs whole-document `get`/`set`, so
//! that is the entire contract:
//!
//! - `Store` - raw JSON get/set, implemented per backend
//! - `StoreExt` - typed helpers layered over any `Store`
//! - `MemoryStore` - in-process map with an optional byte quota
//! - `FileStore` - one `<key>.json` file per collection

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Quota exceeded writing '{key}': {needed} bytes needed, {available} available")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("Corrupt value under '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Synchronous whole-value key-value access
pub trait Store: Send + Sync {
    /// Read the JSON value stored under `key`, if any
    fn get_raw(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value stored under `key`
    fn set_raw(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Every key currently holding a value
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Typed access over any store
pub trait StoreExt: Store {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_raw(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Read `key`, falling back to `default` when it is absent
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, StoreError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.set_raw(key, value)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
