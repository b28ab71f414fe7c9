use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clients::document_store::DocumentStore;
use crate::error::SyncError;
use crate::models::{ContentChange, DocumentId, WsEvent};
use super::linebuffer::LineBuffer;
use super::registry::SessionRegistry;
use super::scheduler::PersistenceScheduler;
use super::session::{LoadStatus, PendingEdit, Session, SessionState, MAX_PENDING_EDITS};
use super::viewer::Viewer;

/// Aggregate counters over all live sessions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub sessions: u32,
    pub viewers: u32,
    pub loading: u32,
    pub dirty: u32,
}

/// Orchestrates viewer connections, edits and presence for all documents.
#[derive(Clone)]
pub struct SyncEngine {
    registry: Arc<SessionRegistry>,
    scheduler: Arc<PersistenceScheduler>,
    store: Arc<dyn DocumentStore>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn DocumentStore>, debounce: Duration) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let scheduler = Arc::new(PersistenceScheduler::new(debounce, registry.clone(), store.clone()));
        Self { registry, scheduler, store }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<PersistenceScheduler> {
        &self.scheduler
    }

    /// Register a new viewer on `doc_id`.
    ///
    /// Existing peers are told about the newcomer, the newcomer receives one
    /// `VIEWER_CONNECTED` per existing peer, and only then is it added. The
    /// first viewer of a document triggers the initial load in the background.
    pub async fn join(
        &self,
        doc_id: DocumentId,
        name: &str,
        outbound: Sender<String>,
    ) -> Result<Viewer, SyncError> {
        loop {
            let (session, is_new) = self.registry.get_or_create(doc_id).await;
            if let Some(joined) = self.admit(session, is_new, name, &outbound).await {
                return joined;
            }
            // Removed between lookup and lock, retry with a fresh session
        }
    }

    /// Add a viewer to `session`. Returns `None` when the session was closed
    /// before its lock could be taken.
    async fn admit(
        &self,
        session: Arc<Session>,
        is_new: bool,
        name: &str,
        outbound: &Sender<String>,
    ) -> Option<Result<Viewer, SyncError>> {
        let doc_id = session.doc_id;
        // Whoever created the session loads it, even if its own join is refused
        if is_new {
            let engine = self.clone();
            let session = session.clone();
            tokio::spawn(async move { engine.load(session).await });
        }

        let mut state = session.state.lock().await;
        if state.closed {
            return None;
        }
        if state.has_name(name) {
            return Some(Err(SyncError::NameTaken(name.to_string())));
        }

        let viewer = Viewer::new(doc_id, name, outbound.clone());
        let failed = state.broadcast_event(&WsEvent::viewer_connected(name), None);
        for peer in state.viewers.values() {
            viewer.send_event(&WsEvent::viewer_connected(&peer.name));
        }
        state.viewers.insert(viewer.id, viewer.clone());
        info!(
            "Viewer '{}' joined document {} ({} viewers)",
            name,
            doc_id,
            state.viewers.len()
        );
        drop(state);

        self.disconnect_all(doc_id, failed).await;
        Some(Ok(viewer))
    }

    async fn load(&self, session: Arc<Session>) {
        let doc_id = session.doc_id;
        let result = self.store.get_by_id(doc_id).await;

        let failed = {
            let mut state = session.state.lock().await;
            if state.closed {
                debug!("Discarding load of document {}, session already closed", doc_id);
                return;
            }
            let pending: Vec<PendingEdit> = state.pending.drain(..).collect();
            match result {
                Ok(doc) => {
                    state.buffer = LineBuffer::from_document(&doc.title, &doc.content);
                    state.status = LoadStatus::Ready;
                    info!(
                        "Loaded document {} ({} lines, {} queued edits)",
                        doc_id,
                        state.buffer.len(),
                        pending.len()
                    );
                    let mut failed = Vec::new();
                    for edit in pending {
                        if state.viewers.contains_key(&edit.viewer_id) {
                            failed.extend(self.apply_and_relay(&mut state, doc_id, edit.viewer_id, &edit.change, &edit.raw));
                        } else {
                            debug!("Dropping queued edit on document {}, its sender already left", doc_id);
                        }
                    }
                    failed
                }
                Err(e) => {
                    error!("Failed to load document {}: {}", doc_id, e);
                    state.status = LoadStatus::Failed;
                    let reply = WsEvent::error(SyncError::Unavailable(doc_id).to_string());
                    pending
                        .iter()
                        .filter_map(|edit| state.viewers.get(&edit.viewer_id))
                        .filter(|viewer| !viewer.send_event(&reply))
                        .map(|viewer| viewer.id)
                        .collect()
                }
            }
        };
        self.disconnect_all(doc_id, failed).await;
    }

    /// Process one inbound text frame from `viewer`.
    pub async fn handle_message(&self, viewer: &Viewer, raw: &str) {
        let change = match parse_change(raw) {
            Ok(change) => change,
            Err(e) => {
                warn!("Rejected message from '{}' on document {}: {}", viewer.name, viewer.doc_id, e);
                if !viewer.send_event(&WsEvent::error(e.to_string())) {
                    self.leave(viewer).await;
                }
                return;
            }
        };

        let doc_id = viewer.doc_id;
        let Some(session) = self.registry.get(doc_id).await else {
            return;
        };

        let failed = {
            let mut state = session.state.lock().await;
            if state.closed || !state.viewers.contains_key(&viewer.id) {
                return;
            }
            let status = state.status;
            match status {
                LoadStatus::Ready => self.apply_and_relay(&mut state, doc_id, viewer.id, &change, raw),
                LoadStatus::Loading if state.pending.len() < MAX_PENDING_EDITS => {
                    debug!("Queued edit from '{}' while document {} loads", viewer.name, doc_id);
                    state.pending.push_back(PendingEdit {
                        viewer_id: viewer.id,
                        change,
                        raw: raw.to_string(),
                    });
                    Vec::new()
                }
                LoadStatus::Loading => reply_error(&state, viewer.id, &SyncError::LoadQueueFull),
                LoadStatus::Failed => reply_error(&state, viewer.id, &SyncError::Unavailable(doc_id)),
            }
        };
        self.disconnect_all(doc_id, failed).await;
    }

    /// Apply `change` and relay `raw` to every peer of the sender. Must be
    /// called with the session lock held. Returns viewers found disconnected.
    fn apply_and_relay(
        &self,
        state: &mut SessionState,
        doc_id: DocumentId,
        sender: Uuid,
        change: &ContentChange,
        raw: &str,
    ) -> Vec<Uuid> {
        match state.apply(change) {
            Ok(()) => {
                let failed = state.broadcast(raw, Some(sender));
                self.scheduler.on_edit(doc_id);
                failed
            }
            Err(e) => {
                warn!("Rejected edit on document {}: {}", doc_id, e);
                reply_error(state, sender, &SyncError::from(e))
            }
        }
    }

    /// Remove `viewer` from its session, announcing the departure to peers.
    pub async fn leave(&self, viewer: &Viewer) {
        self.disconnect_all(viewer.doc_id, vec![viewer.id]).await;
    }

    // A failed send while announcing a departure disconnects that peer too,
    // so work through them as a queue instead of recursing.
    async fn disconnect_all(&self, doc_id: DocumentId, mut viewer_ids: Vec<Uuid>) {
        while let Some(viewer_id) = viewer_ids.pop() {
            viewer_ids.extend(self.disconnect(doc_id, viewer_id).await);
        }
    }

    async fn disconnect(&self, doc_id: DocumentId, viewer_id: Uuid) -> Vec<Uuid> {
        let Some(session) = self.registry.get(doc_id).await else {
            return Vec::new();
        };

        let (failed, now_empty) = {
            let mut state = session.state.lock().await;
            let Some(viewer) = state.viewers.remove(&viewer_id) else {
                return Vec::new();
            };
            info!(
                "Viewer '{}' left document {} ({} viewers)",
                viewer.name,
                doc_id,
                state.viewers.len()
            );
            let failed = state.broadcast_event(&WsEvent::viewer_disconnected(&viewer.name), None);
            (failed, state.viewers.is_empty())
        };

        if now_empty {
            // Persist while the session is still registered, so a viewer
            // joining meanwhile reuses it instead of loading stale content.
            self.scheduler.final_flush(&session).await;
            if self.registry.remove_if_empty(doc_id, &session).await {
                info!("Closed session for document {}", doc_id);
            }
        }
        failed
    }

    pub async fn stats(&self) -> EngineStats {
        let mut stats = EngineStats::default();
        for session in self.registry.sessions().await {
            let state = session.state.lock().await;
            stats.sessions += 1;
            stats.viewers += state.viewers.len() as u32;
            if state.status == LoadStatus::Loading {
                stats.loading += 1;
            }
            if state.dirty {
                stats.dirty += 1;
            }
        }
        stats
    }

    /// Flush every session with unflushed edits. Used on shutdown.
    pub async fn flush_all(&self) {
        for session in self.registry.sessions().await {
            self.scheduler.final_flush(&session).await;
        }
    }
}

fn parse_change(raw: &str) -> Result<ContentChange, SyncError> {
    match serde_json::from_str::<WsEvent>(raw) {
        Ok(WsEvent::ContentChanged(change)) => Ok(change),
        Ok(_) => Err(SyncError::UnsupportedEvent),
        Err(e) => Err(SyncError::Malformed(e.to_string())),
    }
}

fn reply_error(state: &SessionState, viewer_id: Uuid, err: &SyncError) -> Vec<Uuid> {
    match state.viewers.get(&viewer_id) {
        Some(viewer) if !viewer.send_event(&WsEvent::error(err.to_string())) => vec![viewer_id],
        _ => Vec::new(),
    }
}
