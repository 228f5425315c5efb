//! Remote document service: the user-provided network layer.
//!
//! Each sync id addresses one document in the
//! [`SYNC_COLLECTION`](crate::storage::keys::SYNC_COLLECTION) collection.
//! Documents are raw JSON objects. The engine validates shape itself so a
//! service never has to know the habit schema, and unknown fields written by
//! newer clients survive merge-set writes.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

/// Callback receiving each change of a subscribed document.
/// `None` means the document does not exist (or was deleted).
pub type SnapshotCallback = dyn Fn(Option<Value>) + Send + Sync;

/// A document-oriented store with one addressable document per sync id.
#[async_trait]
pub trait RemoteDocumentService: Send + Sync {
    /// Whether credentials/configuration are present. Cheap, never blocks.
    fn is_configured(&self) -> bool;

    /// Establish identity/session before any other call.
    ///
    /// `Err(RemoteError::NotConfigured)` when configuration is absent,
    /// `Err(RemoteError::NotReady)` when establishment fails.
    async fn ensure_ready(&self) -> Result<(), RemoteError>;

    /// One-shot read. `Ok(None)` if the document does not exist.
    async fn get_document(&self, id: &str) -> Result<Option<Value>, RemoteError>;

    /// Merge `payload`'s top-level fields into the document, creating it if
    /// needed. Fields absent from `payload` are left untouched.
    async fn merge_set(&self, id: &str, payload: Value) -> Result<(), RemoteError>;

    /// Deliver every subsequent change of document `id` to `on_change` until
    /// the returned [`Subscription`] is cancelled or dropped.
    fn subscribe(
        &self,
        id: &str,
        on_change: std::sync::Arc<SnapshotCallback>,
    ) -> Result<Subscription, RemoteError>;
}

/// Live change subscription. Cancelled on [`cancel`](Self::cancel) or drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Stop delivery. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
