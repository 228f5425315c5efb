//! Sync-specific types: connect options and outcomes, the engine phase
//! machine, the status indicator, and engine construction options.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::remote::RemoteDocumentService;
use crate::storage::LocalStore;
use crate::tracker::HabitTracker;

/// Quiet period before a scheduled push fires.
pub const DEFAULT_PUSH_DEBOUNCE: Duration = Duration::from_millis(800);

// ============================================================================
// Connect
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Never prompt; an existing remote document always wins. Used for the
    /// automatic reconnect on startup.
    pub silent: bool,
}

impl ConnectOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }

    pub fn interactive() -> Self {
        Self { silent: false }
    }
}

/// The caller's answer when a non-silent connect finds an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeChoice {
    /// Replace local state with the remote document.
    UseRemote,
    /// Overwrite the remote document with local state.
    OverwriteRemote,
}

/// What `connect` did with the bound document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// No document existed; local state was pushed to create it.
    Initialized,
    /// Local state was replaced by the remote document.
    AdoptedRemote,
    /// The remote document was overwritten with local state.
    OverwroteRemote,
    /// The remote document was chosen but failed shape validation; local
    /// state is unchanged.
    RemoteMalformed,
}

/// Result of the startup auto-reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoConnect {
    /// Sync was not enabled, no sync id was stored, or the remote service is
    /// not configured.
    Skipped,
    Connected(ConnectOutcome),
    /// The attempt failed; the reason is also reflected in the status.
    Failed(String),
}

// ============================================================================
// Remote change handling
// ============================================================================

/// How a remote change notification was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChangeOutcome {
    /// The document does not exist.
    Missing,
    /// The notification belongs to a binding that has since been replaced
    /// or torn down.
    Unbound,
    /// Written by this client.
    Echo,
    /// `updatedAtMs` is not newer than the last applied document.
    Stale,
    /// Shape validation failed; nothing was applied.
    Malformed,
    Applied,
}

// ============================================================================
// Phase and status
// ============================================================================

/// Engine push/apply state.
///
/// Pushes are only scheduled outside `ApplyingRemote`; a remote apply holds
/// that phase for its whole synchronous duration so the local writes it causes
/// are not mistaken for user edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    /// A debounced push is armed.
    PushPending,
    ApplyingRemote,
}

/// The visible sync indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    /// Remote credentials/configuration are absent.
    NotConfigured,
    #[default]
    Off,
    Connecting,
    On { sync_id: String },
    /// The last connect attempt failed.
    Unavailable { reason: String },
}

impl SyncStatus {
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On { .. })
    }

    /// Short button label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::On { .. } => "Synced",
            _ => "Sync",
        }
    }
}

// ============================================================================
// SyncEngine Options
// ============================================================================

/// Called after remote state was applied. The flag is `true` for a full
/// refresh; the engine always passes `false` so scroll/focus is kept.
pub type RenderCallback = dyn Fn(bool) + Send + Sync;

/// Called on every status transition.
pub type StatusCallback = dyn Fn(&SyncStatus) + Send + Sync;

/// Asked once per non-silent connect that finds an existing document.
pub type MergePromptCallback = dyn Fn(&Value) -> MergeChoice + Send + Sync;

/// Configuration for `SyncEngine`.
pub struct SyncEngineOptions {
    pub tracker: Arc<HabitTracker>,
    /// Holds the sync session fields and the client id.
    pub store: Arc<dyn LocalStore>,
    pub remote: Arc<dyn RemoteDocumentService>,
    /// Push debounce (`None` = [`DEFAULT_PUSH_DEBOUNCE`]).
    pub debounce: Option<Duration>,
    pub on_render: Option<Arc<RenderCallback>>,
    pub on_status: Option<Arc<StatusCallback>>,
    /// Merge prompt (`None` = always [`MergeChoice::UseRemote`]).
    pub on_merge_prompt: Option<Arc<MergePromptCallback>>,
}

impl SyncEngineOptions {
    pub fn new(
        tracker: Arc<HabitTracker>,
        store: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteDocumentService>,
    ) -> Self {
        Self {
            tracker,
            store,
            remote,
            debounce: None,
            on_render: None,
            on_status: None,
            on_merge_prompt: None,
        }
    }
}
