use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::DocumentId;
use super::session::Session;

/// Owns every live session, keyed by document id.
///
/// Lock order is registry first, then a session's `state`. Nothing holding
/// a session lock ever waits on the registry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<DocumentId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert. The flag is true only for the caller that
    /// created the session, which is then responsible for the initial load.
    pub async fn get_or_create(&self, doc_id: DocumentId) -> (Arc<Session>, bool) {
        if let Some(session) = self.sessions.read().await.get(&doc_id) {
            return (session.clone(), false);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&doc_id) {
            return (session.clone(), false);
        }
        let session = Arc::new(Session::new(doc_id));
        sessions.insert(doc_id, session.clone());
        debug!("Created session for document {}", doc_id);
        (session, true)
    }

    pub async fn get(&self, doc_id: DocumentId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&doc_id).cloned()
    }

    /// Remove `session` if it is still the registered instance for `doc_id`
    /// and has no viewers. The emptiness check and the removal happen under
    /// the registry write lock, and the session is marked closed so a
    /// joiner that raced us retries with a fresh session.
    pub async fn remove_if_empty(&self, doc_id: DocumentId, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&doc_id) {
            Some(current) if Arc::ptr_eq(current, session) => {}
            _ => return false,
        }

        let mut state = session.state.lock().await;
        if !state.viewers.is_empty() {
            return false;
        }
        state.closed = true;
        sessions.remove(&doc_id);
        debug!("Removed session for document {}", doc_id);
        true
    }

    pub async fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
