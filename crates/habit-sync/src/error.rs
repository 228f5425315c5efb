use thiserror::Error;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Stored value for \"{key}\" is not valid JSON")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize value for \"{key}\"")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Local store backend error: {0}")]
    Backend(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Failures reported by a [`RemoteDocumentService`](crate::remote::RemoteDocumentService).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials or configuration are absent.
    #[error("Cloud sync is not configured")]
    NotConfigured,

    /// Configured, but identity/session establishment failed.
    #[error("Cloud sync is not ready: {0}")]
    NotReady(String),

    #[error("Remote read failed: {0}")]
    Read(String),

    #[error("Remote write failed: {0}")]
    Write(String),

    #[error("Remote subscription failed: {0}")]
    Subscribe(String),
}

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync id must be a non-empty string")]
    InvalidSyncId,

    #[error("Cloud sync is not enabled on this device")]
    Disabled,

    /// The engine was constructed outside a tokio runtime.
    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// `true` for the "not ready" family (not configured, or readiness failed).
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteError::NotConfigured) | Self::Remote(RemoteError::NotReady(_))
        )
    }
}

// ---------------------------------------------------------------------------
// TrackerError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Habit name must not be empty")]
    EmptyName,

    #[error("Habit not found: {0}")]
    HabitNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required remote config fields: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Config endpoint returned an error: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// HabitSyncError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HabitSyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, HabitSyncError>;
