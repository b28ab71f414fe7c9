use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::clients::document_store::DocumentStore;
use crate::models::{DocumentContent, DocumentId};
use super::registry::SessionRegistry;
use super::session::Session;

/// Debounced write-back of session buffers to the Document Store.
///
/// At most one pending flush exists per document. Re-arming cancels the
/// previous timer. Once a timer fires it disarms itself and is no longer
/// cancelable, so an in-flight store write is never aborted halfway.
pub struct PersistenceScheduler {
    debounce: Duration,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn DocumentStore>,
    pending: Mutex<HashMap<DocumentId, (u64, AbortHandle)>>,
    next_generation: AtomicU64,
}

impl PersistenceScheduler {
    pub fn new(debounce: Duration, registry: Arc<SessionRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            debounce,
            registry,
            store,
            pending: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<DocumentId, (u64, AbortHandle)>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel any pending flush for `doc_id` and schedule a new one.
    pub fn on_edit(self: &Arc<Self>, doc_id: DocumentId) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let scheduler = self.clone();

        // The map stays locked until the new handle is stored, so the timer
        // cannot disarm before it is registered.
        let mut pending = self.lock_pending();
        if let Some((_, previous)) = pending.remove(&doc_id) {
            previous.abort();
        }
        let task = tokio::spawn(async move {
            tokio::time::sleep(scheduler.debounce).await;
            if scheduler.disarm(doc_id, generation) {
                scheduler.flush(doc_id).await;
            }
        });
        pending.insert(doc_id, (generation, task.abort_handle()));
    }

    fn disarm(&self, doc_id: DocumentId, generation: u64) -> bool {
        let mut pending = self.lock_pending();
        match pending.get(&doc_id) {
            Some((current, _)) if *current == generation => {
                pending.remove(&doc_id);
                true
            }
            _ => false,
        }
    }

    /// Cancel the pending flush for `doc_id`. Returns true if one was armed.
    pub fn cancel(&self, doc_id: DocumentId) -> bool {
        match self.lock_pending().remove(&doc_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Write the current buffer of `doc_id` back, if the session still
    /// exists and has unflushed edits.
    pub async fn flush(&self, doc_id: DocumentId) {
        let Some(session) = self.registry.get(doc_id).await else {
            debug!("Skipping flush of document {}, session is gone", doc_id);
            return;
        };

        let _order = session.flush_lock.lock().await;
        let snapshot = {
            let mut state = session.state.lock().await;
            if state.closed {
                debug!("Skipping flush of document {}, session closed", doc_id);
                return;
            }
            state.take_snapshot()
        };
        if let Some(content) = snapshot {
            self.write(&session, content).await;
        }
    }

    /// Flush a session that has just been removed from the registry.
    pub async fn final_flush(&self, session: &Arc<Session>) {
        self.cancel(session.doc_id);

        let _order = session.flush_lock.lock().await;
        let snapshot = session.state.lock().await.take_snapshot();
        match snapshot {
            Some(content) => {
                info!("Final flush of document {} after last viewer left", session.doc_id);
                self.write(session, content).await;
            }
            None => debug!("Document {} has no unflushed edits", session.doc_id),
        }
    }

    async fn write(&self, session: &Arc<Session>, content: DocumentContent) {
        match self.store.update(session.doc_id, &content).await {
            Ok(()) => info!("Document {} persisted ({} bytes)", session.doc_id, content.content.len()),
            Err(e) => {
                error!("Failed to persist document {}: {}", session.doc_id, e);
                session.state.lock().await.dirty = true;
            }
        }
    }
}
