//! SyncEngine: last-writer-wins convergence between the local tracker and
//! one shared remote document.
//!
//! Local mutations schedule a debounced merge-set of the full habit state.
//! Remote changes arrive through a subscription and replace local state
//! wholesale unless they are echoes of this client's own write or are not
//! newer than the last applied document. Background failures never surface as
//! errors; they are logged and reflected in [`SyncStatus`].
//!
//! Concurrent edits on two devices inside one debounce window are resolved by
//! whichever write lands last: the other device's edits are lost without
//! notice. There is no merge of concurrent changes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, SyncError};
use crate::remote::{RemoteDocumentService, SnapshotCallback, Subscription};
use crate::storage::keys::SYNC_ID_KEY;
use crate::storage::LocalStore;
use crate::tracker::{HabitTracker, ListenerId, TrackerEvent};
use crate::types::{parse_remote_data, remote_updated_at_ms, remote_updated_by, SyncDocument};

use super::debounce::Debouncer;
use super::session::{
    generate_sync_id, load_or_create_client_id, persist_disabled, persist_enabled,
    PersistedSession, SyncSession,
};
use super::types::*;

// ============================================================================
// SyncEngine
// ============================================================================

/// Owns the sync session of one device.
///
/// Construct inside a tokio runtime; the debounce timer is spawned on the
/// runtime captured by [`SyncEngine::new`].
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    tracker: Arc<HabitTracker>,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteDocumentService>,
    debouncer: Debouncer,
    state: Mutex<EngineState>,
    /// Serializes remote applies across threads.
    apply_lock: Mutex<()>,
    status: Mutex<SyncStatus>,
    tracker_listener: Mutex<Option<ListenerId>>,
    on_render: Option<Arc<RenderCallback>>,
    on_status: Option<Arc<StatusCallback>>,
    on_merge_prompt: Option<Arc<MergePromptCallback>>,
}

struct EngineState {
    session: SyncSession,
    phase: SyncPhase,
    /// Bumped on every bind/unbind; subscription callbacks and push timers
    /// carrying an older epoch are ignored.
    epoch: u64,
    /// Id of the bound remote document.
    doc_id: Option<String>,
    subscription: Option<Subscription>,
    /// Floor for the next `updatedAtMs`: newer than anything this engine
    /// pushed, applied or overwrote.
    last_stamp_ms: i64,
}

impl SyncEngine {
    /// Build an engine and register it as a listener on the tracker.
    ///
    /// Loads (or creates and persists) the stable client id. Does not touch
    /// the network; call [`init`](Self::init) for the startup reconnect.
    pub fn new(options: SyncEngineOptions) -> Result<Self, SyncError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Runtime(e.to_string()))?;
        let client_id = load_or_create_client_id(options.store.as_ref())?;
        let status = if options.remote.is_configured() {
            SyncStatus::Off
        } else {
            SyncStatus::NotConfigured
        };

        let inner = Arc::new(EngineInner {
            tracker: options.tracker,
            store: options.store,
            remote: options.remote,
            debouncer: Debouncer::new(runtime, options.debounce.unwrap_or(DEFAULT_PUSH_DEBOUNCE)),
            state: Mutex::new(EngineState {
                session: SyncSession::new(client_id),
                phase: SyncPhase::Idle,
                epoch: 0,
                doc_id: None,
                subscription: None,
                last_stamp_ms: 0,
            }),
            apply_lock: Mutex::new(()),
            status: Mutex::new(status),
            tracker_listener: Mutex::new(None),
            on_render: options.on_render,
            on_status: options.on_status,
            on_merge_prompt: options.on_merge_prompt,
        });

        let weak = Arc::downgrade(&inner);
        let listener = inner.tracker.on_change(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match event {
                // A local reset leaves the shared document alone.
                TrackerEvent::Reset => {
                    if inner.state.lock().session.enabled {
                        inner.disconnect();
                    }
                }
                _ => {
                    inner.schedule_push();
                }
            }
        });
        *inner.tracker_listener.lock() = Some(listener);

        Ok(Self { inner })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Startup auto-reconnect.
    ///
    /// Reconnects silently when sync was enabled with a stored sync id and the
    /// remote service is configured. Never fails: problems end up in the
    /// status indicator.
    pub async fn init(&self) -> AutoConnect {
        self.inner.init().await
    }

    /// Flush a pending push, then release the subscription and timer.
    ///
    /// Persisted session flags are kept so the next start reconnects.
    pub async fn shutdown(&self) {
        if let Err(e) = self.flush().await {
            warn!(error = %e, "final push before shutdown failed");
        }
        if let Some(id) = self.inner.tracker_listener.lock().take() {
            self.inner.tracker.off_change(id);
        }
        self.inner.unbind();
        info!("sync engine shut down");
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Bind to the document addressed by `sync_id` and negotiate state.
    ///
    /// See [`ConnectOutcome`] for the possible results. Fails without touching
    /// the session when the remote service is not ready.
    pub async fn connect(
        &self,
        sync_id: &str,
        options: ConnectOptions,
    ) -> Result<ConnectOutcome, SyncError> {
        self.inner.connect(sync_id, options).await
    }

    /// Start a new sync session under a freshly generated code.
    pub async fn create(&self) -> Result<(String, ConnectOutcome), SyncError> {
        let sync_id = generate_sync_id();
        let outcome = self
            .inner
            .connect(&sync_id, ConnectOptions::interactive())
            .await?;
        Ok((sync_id, outcome))
    }

    /// Cancel the subscription and any pending push, and turn sync off.
    /// Idempotent.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    // -----------------------------------------------------------------------
    // Push path
    // -----------------------------------------------------------------------

    /// Arm (or re-arm) the debounced push. Returns `false` when skipped: sync
    /// off, no document bound, or a remote apply in progress.
    pub fn schedule_push(&self) -> bool {
        self.inner.schedule_push()
    }

    /// Merge-set the current local state into the bound document now.
    pub async fn push_local(&self) -> Result<(), SyncError> {
        self.inner.push_local().await
    }

    /// Run a pending debounced push immediately. Returns whether one was
    /// pending.
    pub async fn flush(&self) -> Result<bool, SyncError> {
        self.inner.flush().await
    }

    // -----------------------------------------------------------------------
    // Remote path
    // -----------------------------------------------------------------------

    /// Process a change notification for the currently bound document.
    pub fn handle_remote_change(&self, snapshot: Option<Value>) -> RemoteChangeOutcome {
        let epoch = self.inner.state.lock().epoch;
        self.inner.handle_remote_change(epoch, snapshot)
    }

    /// Validate `doc` and replace local state with it. Returns `false` (and
    /// changes nothing) for a malformed document.
    pub fn apply_remote(&self, doc: &Value) -> bool {
        self.inner.apply_remote(doc)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn client_id(&self) -> String {
        self.inner.state.lock().session.client_id.clone()
    }

    pub fn sync_id(&self) -> Option<String> {
        self.inner.state.lock().session.sync_id.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().session.enabled
    }

    pub fn session(&self) -> SyncSession {
        self.inner.state.lock().session.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.state.lock().phase
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.lock().clone()
    }

    /// The persisted sync code, kept after disconnect as the default join code.
    pub fn last_sync_id(&self) -> Option<String> {
        match self.inner.store.get(SYNC_ID_KEY) {
            Ok(id) => id.filter(|id| !id.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "failed to read stored sync id");
                None
            }
        }
    }

    pub fn tracker(&self) -> &Arc<HabitTracker> {
        &self.inner.tracker
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(id) = self.inner.tracker_listener.lock().take() {
            self.inner.tracker.off_change(id);
        }
    }
}

// ============================================================================
// EngineInner
// ============================================================================

impl EngineInner {
    async fn init(self: &Arc<Self>) -> AutoConnect {
        if !self.remote.is_configured() {
            self.set_status(SyncStatus::NotConfigured);
            return AutoConnect::Skipped;
        }
        let persisted = match PersistedSession::load(self.store.as_ref()) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to read persisted sync session");
                return AutoConnect::Skipped;
            }
        };
        let Some(sync_id) = persisted.should_reconnect() else {
            return AutoConnect::Skipped;
        };

        match self.connect(sync_id, ConnectOptions::silent()).await {
            Ok(outcome) => {
                info!(%sync_id, ?outcome, "reconnected cloud sync");
                AutoConnect::Connected(outcome)
            }
            Err(e) => {
                warn!(%sync_id, error = %e, "automatic sync reconnect failed");
                AutoConnect::Failed(e.to_string())
            }
        }
    }

    async fn connect(
        self: &Arc<Self>,
        sync_id: &str,
        options: ConnectOptions,
    ) -> Result<ConnectOutcome, SyncError> {
        let sync_id = sync_id.trim();
        if sync_id.is_empty() {
            return Err(SyncError::InvalidSyncId);
        }

        self.set_status(SyncStatus::Connecting);
        if let Err(e) = self.remote.ensure_ready().await {
            self.set_status(match e {
                RemoteError::NotConfigured => SyncStatus::NotConfigured,
                ref other => SyncStatus::Unavailable {
                    reason: other.to_string(),
                },
            });
            return Err(e.into());
        }

        if let Err(e) = self.bind(sync_id) {
            self.set_status(SyncStatus::Unavailable {
                reason: e.to_string(),
            });
            return Err(e);
        }
        self.set_status(SyncStatus::On {
            sync_id: sync_id.to_string(),
        });
        info!(%sync_id, silent = options.silent, "cloud sync connected");

        let existing = self.remote.get_document(sync_id).await?;
        let Some(doc) = existing else {
            self.push_local().await?;
            return Ok(ConnectOutcome::Initialized);
        };

        let choice = if options.silent {
            MergeChoice::UseRemote
        } else {
            match &self.on_merge_prompt {
                Some(prompt) => catch_unwind(AssertUnwindSafe(|| prompt(&doc)))
                    .unwrap_or_else(|_| {
                        warn!(%sync_id, "merge prompt panicked, adopting remote state");
                        MergeChoice::UseRemote
                    }),
                None => MergeChoice::UseRemote,
            }
        };
        debug!(%sync_id, ?choice, "remote document exists");

        match choice {
            MergeChoice::UseRemote => {
                {
                    let mut state = self.state.lock();
                    let ts = remote_updated_at_ms(&doc);
                    if ts > state.session.last_applied_remote_ms {
                        state.session.last_applied_remote_ms = ts;
                    }
                }
                if self.apply_remote(&doc) {
                    Ok(ConnectOutcome::AdoptedRemote)
                } else {
                    Ok(ConnectOutcome::RemoteMalformed)
                }
            }
            MergeChoice::OverwriteRemote => {
                {
                    let mut state = self.state.lock();
                    state.last_stamp_ms = state.last_stamp_ms.max(remote_updated_at_ms(&doc));
                }
                self.push_local().await?;
                Ok(ConnectOutcome::OverwroteRemote)
            }
        }
    }

    /// Replace any existing binding with one on `sync_id`, subscribe, and
    /// mark the session enabled.
    fn bind(self: &Arc<Self>, sync_id: &str) -> Result<(), SyncError> {
        let (epoch, previous) = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.doc_id = Some(sync_id.to_string());
            state.session.last_applied_remote_ms = 0;
            if state.phase == SyncPhase::PushPending {
                state.phase = SyncPhase::Idle;
            }
            (state.epoch, state.subscription.take())
        };
        self.debouncer.cancel();
        // Unsubscribe before resubscribing.
        drop(previous);

        let weak: Weak<Self> = Arc::downgrade(self);
        let callback: Arc<SnapshotCallback> = Arc::new(move |snapshot| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_remote_change(epoch, snapshot);
            }
        });

        let subscription = match self.remote.subscribe(sync_id, callback) {
            Ok(sub) => sub,
            Err(e) => {
                let mut state = self.state.lock();
                if state.epoch == epoch {
                    state.doc_id = None;
                    state.session.enabled = false;
                    state.session.sync_id = None;
                }
                return Err(e.into());
            }
        };

        {
            let mut state = self.state.lock();
            state.subscription = Some(subscription);
            state.session.enabled = true;
            state.session.sync_id = Some(sync_id.to_string());
        }

        if let Err(e) = persist_enabled(self.store.as_ref(), sync_id) {
            warn!(%sync_id, error = %e, "failed to persist sync session");
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.unbind();
        if let Err(e) = persist_disabled(self.store.as_ref()) {
            warn!(error = %e, "failed to persist sync disabled flag");
        }
        info!("cloud sync disconnected");
    }

    /// Drop the binding, the subscription and any armed push.
    fn unbind(&self) {
        let subscription = {
            let mut state = self.state.lock();
            state.epoch += 1;
            state.doc_id = None;
            state.session.enabled = false;
            state.session.sync_id = None;
            state.session.last_applied_remote_ms = 0;
            if state.phase == SyncPhase::PushPending {
                state.phase = SyncPhase::Idle;
            }
            state.subscription.take()
        };
        self.debouncer.cancel();
        drop(subscription);
        self.set_status(if self.remote.is_configured() {
            SyncStatus::Off
        } else {
            SyncStatus::NotConfigured
        });
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    fn schedule_push(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if !state.session.enabled || state.doc_id.is_none() {
            return false;
        }
        if state.phase == SyncPhase::ApplyingRemote {
            debug!("skipping push scheduling during remote apply");
            return false;
        }

        let epoch = state.epoch;
        let inner = Arc::clone(self);
        self.debouncer
            .schedule(move || async move { inner.fire_scheduled_push(epoch).await });
        state.phase = SyncPhase::PushPending;
        true
    }

    async fn fire_scheduled_push(&self, epoch: u64) {
        {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return;
            }
            if state.phase == SyncPhase::ApplyingRemote {
                debug!("scheduled push superseded by remote apply");
                return;
            }
            state.phase = SyncPhase::Idle;
        }
        if let Err(e) = self.push_local().await {
            // No retry: the next local mutation schedules another push.
            warn!(error = %e, "scheduled push failed");
        }
    }

    async fn flush(&self) -> Result<bool, SyncError> {
        if !self.debouncer.cancel() {
            return Ok(false);
        }
        {
            let mut state = self.state.lock();
            if state.phase == SyncPhase::PushPending {
                state.phase = SyncPhase::Idle;
            }
        }
        self.push_local().await?;
        Ok(true)
    }

    async fn push_local(&self) -> Result<(), SyncError> {
        let (doc_id, client_id, updated_at_ms) = {
            let mut state = self.state.lock();
            let (doc_id, client_id) = match (&state.doc_id, state.session.enabled) {
                (Some(doc_id), true) => (doc_id.clone(), state.session.client_id.clone()),
                _ => return Err(SyncError::Disabled),
            };
            // Strictly after every stamp this engine pushed, applied or overwrote.
            let floor = state
                .last_stamp_ms
                .max(state.session.last_applied_remote_ms)
                .saturating_add(1);
            let updated_at_ms = chrono::Utc::now().timestamp_millis().max(floor);
            state.last_stamp_ms = updated_at_ms;
            (doc_id, client_id, updated_at_ms)
        };

        let doc = SyncDocument::new(self.tracker.snapshot(), updated_at_ms, client_id);
        self.remote.merge_set(&doc_id, doc.to_value()).await?;
        debug!(sync_id = %doc_id, updated_at_ms, habits = doc.habits.len(), "pushed local state");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remote
    // -----------------------------------------------------------------------

    fn handle_remote_change(&self, epoch: u64, snapshot: Option<Value>) -> RemoteChangeOutcome {
        let Some(doc) = snapshot else {
            debug!("remote document missing, ignoring");
            return RemoteChangeOutcome::Missing;
        };

        {
            let mut state = self.state.lock();
            if state.epoch != epoch || state.doc_id.is_none() {
                return RemoteChangeOutcome::Unbound;
            }
            if remote_updated_by(&doc) == Some(state.session.client_id.as_str()) {
                debug!("ignoring echo of own write");
                return RemoteChangeOutcome::Echo;
            }
            let updated_at_ms = remote_updated_at_ms(&doc);
            if updated_at_ms <= state.session.last_applied_remote_ms {
                debug!(
                    updated_at_ms,
                    last_applied = state.session.last_applied_remote_ms,
                    "ignoring stale remote change"
                );
                return RemoteChangeOutcome::Stale;
            }
            state.session.last_applied_remote_ms = updated_at_ms;
        }

        if self.apply_remote(&doc) {
            RemoteChangeOutcome::Applied
        } else {
            RemoteChangeOutcome::Malformed
        }
    }

    fn apply_remote(&self, doc: &Value) -> bool {
        let Some(data) = parse_remote_data(doc) else {
            debug!("ignoring malformed remote document");
            return false;
        };

        let _apply = self.apply_lock.lock();
        self.state.lock().phase = SyncPhase::ApplyingRemote;

        let result = self.tracker.replace_all(data);

        {
            let mut state = self.state.lock();
            state.phase = if self.debouncer.is_pending() {
                SyncPhase::PushPending
            } else {
                SyncPhase::Idle
            };
        }
        if let Err(e) = result {
            warn!(error = %e, "failed to persist applied remote state");
        }

        debug!(updated_at_ms = remote_updated_at_ms(doc), "applied remote state");
        self.render(false);
        true
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    fn set_status(&self, status: SyncStatus) {
        {
            let mut current = self.status.lock();
            if *current == status {
                return;
            }
            *current = status.clone();
        }
        if let Some(ref on_status) = self.on_status {
            // Callback panics must not break sync.
            let _ = catch_unwind(AssertUnwindSafe(|| on_status(&status)));
        }
    }

    fn render(&self, full_refresh: bool) {
        if let Some(ref on_render) = self.on_render {
            let _ = catch_unwind(AssertUnwindSafe(|| on_render(full_refresh)));
        }
    }
}
