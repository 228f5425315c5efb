pub mod debounce;
pub mod engine;
pub mod session;
pub mod types;

pub use debounce::Debouncer;
pub use engine::SyncEngine;
pub use session::{generate_sync_id, PersistedSession, SyncSession};
pub use types::{
    AutoConnect, ConnectOptions, ConnectOutcome, MergeChoice, MergePromptCallback,
    RemoteChangeOutcome, RenderCallback, StatusCallback, SyncEngineOptions, SyncPhase, SyncStatus,
    DEFAULT_PUSH_DEBOUNCE,
};
