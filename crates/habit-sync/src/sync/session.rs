//! Per-device sync session and its persisted fields.

use tracing::{info, warn};

use crate::error::StoreError;
use crate::storage::keys::{CLIENT_ID_KEY, SYNC_ENABLED_KEY, SYNC_ID_KEY};
use crate::storage::LocalStore;

/// Value of [`SYNC_ENABLED_KEY`] while sync is on.
const ENABLED_FLAG: &str = "1";

/// In-memory session bookkeeping of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSession {
    /// Stable for the lifetime of the installation.
    pub client_id: String,
    pub sync_id: Option<String>,
    pub enabled: bool,
    /// `updatedAtMs` of the newest remote document applied in this binding.
    pub last_applied_remote_ms: i64,
}

impl SyncSession {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            sync_id: None,
            enabled: false,
            last_applied_remote_ms: 0,
        }
    }
}

/// Session fields as last persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedSession {
    pub enabled: bool,
    pub sync_id: Option<String>,
}

impl PersistedSession {
    pub fn load(store: &dyn LocalStore) -> Result<Self, StoreError> {
        let enabled = store.get(SYNC_ENABLED_KEY)?.as_deref() == Some(ENABLED_FLAG);
        let sync_id = store.get(SYNC_ID_KEY)?.filter(|id| !id.trim().is_empty());
        Ok(Self { enabled, sync_id })
    }

    /// Both flags needed for an automatic reconnect are present.
    pub fn should_reconnect(&self) -> Option<&str> {
        if self.enabled {
            self.sync_id.as_deref()
        } else {
            None
        }
    }
}

pub(crate) fn persist_enabled(store: &dyn LocalStore, sync_id: &str) -> Result<(), StoreError> {
    store.set(SYNC_ID_KEY, sync_id)?;
    store.set(SYNC_ENABLED_KEY, ENABLED_FLAG)
}

/// Clear the enabled flag. The sync id stays as the default join code.
pub(crate) fn persist_disabled(store: &dyn LocalStore) -> Result<(), StoreError> {
    store.remove(SYNC_ENABLED_KEY)
}

/// Read the installation's client id, generating and persisting one on first
/// use. If the new id cannot be persisted it is still used for this process.
pub fn load_or_create_client_id(store: &dyn LocalStore) -> Result<String, StoreError> {
    if let Some(id) = store.get(CLIENT_ID_KEY)?.filter(|id| !id.is_empty()) {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    match store.set(CLIENT_ID_KEY, &id) {
        Ok(()) => info!(client_id = %id, "generated new sync client id"),
        Err(e) => warn!(client_id = %id, error = %e, "failed to persist sync client id"),
    }
    Ok(id)
}

/// A fresh sync code: 16 random bytes as 32 lowercase hex characters.
pub fn generate_sync_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
