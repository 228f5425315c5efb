//! Local store traits for habit-sync.
//!
//! `LocalStore` is the narrow string key-value trait implemented by concrete
//! backends (in-memory, SQLite). `LocalStoreExt` layers JSON helpers on top
//! and is implemented for every store, including `dyn LocalStore`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Durable device-local key-value persistence.
///
/// All methods are synchronous. Implementors must be `Send + Sync` so a single
/// store can be shared between the tracker and the sync engine.
pub trait LocalStore: Send + Sync {
    /// Read a value. `None` if the key was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), StoreError>;
}

/// JSON conveniences over any [`LocalStore`].
pub trait LocalStoreExt: LocalStore {
    /// Read and deserialize a JSON value.
    ///
    /// Returns `Err(StoreError::Corrupt)` if the key exists but does not
    /// parse as `T`.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Serialize and write a JSON value.
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.set(key, &raw)
    }
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {}
