//! MemoryDocumentService: an in-process `RemoteDocumentService`.
//!
//! Cloning shares the underlying documents, so several engines ("devices")
//! can be wired to one instance. Writes notify every subscriber of the
//! document synchronously, the writer included, after the internal lock has
//! been released. Subscribing does not replay the current snapshot; only
//! later changes are delivered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::config::RemoteConfig;
use crate::error::RemoteError;

use super::traits::{RemoteDocumentService, SnapshotCallback, Subscription};

#[derive(Clone, Default)]
pub struct MemoryDocumentService {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    documents: HashMap<String, Map<String, Value>>,
    subscribers: HashMap<String, Vec<(u64, Arc<SnapshotCallback>)>>,
    next_subscriber: u64,
    configured: bool,
    ready_failure: Option<String>,
    read_failure: Option<String>,
    write_failure: Option<String>,
    merge_writes: usize,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            subscribers: HashMap::new(),
            next_subscriber: 1,
            configured: true,
            ready_failure: None,
            read_failure: None,
            write_failure: None,
            merge_writes: 0,
        }
    }
}

impl MemoryDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service that reports itself configured only when `config` is
    /// complete.
    pub fn with_config(config: &RemoteConfig) -> Self {
        let service = Self::default();
        service.set_configured(config.is_configured());
        service
    }

    // -----------------------------------------------------------------------
    // Switches
    // -----------------------------------------------------------------------

    pub fn set_configured(&self, configured: bool) {
        self.inner.lock().configured = configured;
    }

    /// Make `ensure_ready` fail with `NotReady(reason)`; `None` restores it.
    pub fn fail_ready(&self, reason: Option<&str>) {
        self.inner.lock().ready_failure = reason.map(str::to_string);
    }

    pub fn fail_reads(&self, reason: Option<&str>) {
        self.inner.lock().read_failure = reason.map(str::to_string);
    }

    pub fn fail_writes(&self, reason: Option<&str>) {
        self.inner.lock().write_failure = reason.map(str::to_string);
    }

    // -----------------------------------------------------------------------
    // Inspection and out-of-band writes
    // -----------------------------------------------------------------------

    /// Current content of a document, bypassing readiness checks.
    pub fn document(&self, id: &str) -> Option<Value> {
        self.inner
            .lock()
            .documents
            .get(id)
            .map(|doc| Value::Object(doc.clone()))
    }

    /// Successful `merge_set` calls so far.
    pub fn merge_writes(&self) -> usize {
        self.inner.lock().merge_writes
    }

    pub fn subscriber_count(&self, id: &str) -> usize {
        self.inner
            .lock()
            .subscribers
            .get(id)
            .map_or(0, Vec::len)
    }

    /// Replace a document wholesale and notify subscribers, as another
    /// writer would. Non-object values are stored as an empty object.
    pub fn put_document(&self, id: &str, doc: Value) {
        let fields = match doc {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.inner.lock().documents.insert(id.to_string(), fields);
        self.notify(id);
    }

    /// Delete a document and notify subscribers with `None`.
    pub fn delete_document(&self, id: &str) {
        self.inner.lock().documents.remove(id);
        self.notify(id);
    }

    fn notify(&self, id: &str) {
        let (snapshot, callbacks) = {
            let inner = self.inner.lock();
            let snapshot = inner.documents.get(id).map(|doc| Value::Object(doc.clone()));
            let callbacks: Vec<Arc<SnapshotCallback>> = inner
                .subscribers
                .get(id)
                .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default();
            (snapshot, callbacks)
        };
        for cb in callbacks {
            cb(snapshot.clone());
        }
    }
}

#[async_trait]
impl RemoteDocumentService for MemoryDocumentService {
    fn is_configured(&self) -> bool {
        self.inner.lock().configured
    }

    async fn ensure_ready(&self) -> Result<(), RemoteError> {
        let inner = self.inner.lock();
        if !inner.configured {
            return Err(RemoteError::NotConfigured);
        }
        match &inner.ready_failure {
            Some(reason) => Err(RemoteError::NotReady(reason.clone())),
            None => Ok(()),
        }
    }

    async fn get_document(&self, id: &str) -> Result<Option<Value>, RemoteError> {
        let inner = self.inner.lock();
        if let Some(reason) = &inner.read_failure {
            return Err(RemoteError::Read(reason.clone()));
        }
        Ok(inner.documents.get(id).map(|doc| Value::Object(doc.clone())))
    }

    async fn merge_set(&self, id: &str, payload: Value) -> Result<(), RemoteError> {
        {
            let mut inner = self.inner.lock();
            if let Some(reason) = &inner.write_failure {
                return Err(RemoteError::Write(reason.clone()));
            }
            let Value::Object(fields) = payload else {
                return Err(RemoteError::Write("merge payload must be an object".into()));
            };
            let doc = inner.documents.entry(id.to_string()).or_default();
            for (key, value) in fields {
                doc.insert(key, value);
            }
            inner.merge_writes += 1;
        }
        self.notify(id);
        Ok(())
    }

    fn subscribe(
        &self,
        id: &str,
        on_change: Arc<SnapshotCallback>,
    ) -> Result<Subscription, RemoteError> {
        let sub_id = {
            let mut inner = self.inner.lock();
            let sub_id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner
                .subscribers
                .entry(id.to_string())
                .or_default()
                .push((sub_id, on_change));
            sub_id
        };

        let weak = Arc::downgrade(&self.inner);
        let doc_id = id.to_string();
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock();
                if let Some(subs) = inner.subscribers.get_mut(&doc_id) {
                    subs.retain(|(sid, _)| *sid != sub_id);
                    if subs.is_empty() {
                        inner.subscribers.remove(&doc_id);
                    }
                }
            }
        }))
    }
}
