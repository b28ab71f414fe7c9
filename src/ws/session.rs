use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ContentChange, DocumentContent, DocumentId, WsEvent};
use super::linebuffer::{LineBuffer, LineBufferError};
use super::viewer::Viewer;

/// Maximum number of edits queued while a document is loading.
pub const MAX_PENDING_EDITS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed,
}

/// Edit received before the initial load finished, replayed once it has.
#[derive(Clone, Debug)]
pub struct PendingEdit {
    pub viewer_id: Uuid,
    pub change: ContentChange,
    pub raw: String,
}

/// Live collaborative state of one document.
///
/// `state` is the per-document exclusive lock: every read or mutation of
/// the buffer and the viewer set goes through it. `flush_lock` orders
/// write-backs of the same document so an older snapshot never lands
/// after a newer one. It is never taken while `state` is held.
#[derive(Debug)]
pub struct Session {
    pub doc_id: DocumentId,
    pub state: Mutex<SessionState>,
    pub flush_lock: Mutex<()>,
}

impl Session {
    pub fn new(doc_id: DocumentId) -> Self {
        Self {
            doc_id,
            state: Mutex::new(SessionState::default()),
            flush_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug)]
pub struct SessionState {
    pub status: LoadStatus,
    pub buffer: LineBuffer,
    pub viewers: HashMap<Uuid, Viewer>,
    pub pending: VecDeque<PendingEdit>,
    /// Set by every applied edit, cleared when a flush snapshot is taken.
    pub dirty: bool,
    /// Set once the session has been removed from the registry.
    pub closed: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: LoadStatus::Loading,
            buffer: LineBuffer::default(),
            viewers: HashMap::new(),
            pending: VecDeque::new(),
            dirty: false,
            closed: false,
        }
    }
}

impl SessionState {
    pub fn has_name(&self, name: &str) -> bool {
        self.viewers.values().any(|v| v.name == name)
    }

    /// Send `text` to every viewer except `except`. Returns the ids of
    /// viewers whose connection is gone.
    pub fn broadcast(&self, text: &str, except: Option<Uuid>) -> Vec<Uuid> {
        self.viewers
            .values()
            .filter(|v| Some(v.id) != except)
            .filter(|v| !v.send_text(text))
            .map(|v| v.id)
            .collect()
    }

    pub fn broadcast_event(&self, event: &WsEvent, except: Option<Uuid>) -> Vec<Uuid> {
        self.broadcast(&event.to_text(), except)
    }

    pub fn apply(&mut self, change: &ContentChange) -> Result<(), LineBufferError> {
        match change {
            ContentChange::LineAdded { line_index, cursor_position } => {
                self.buffer.split_line(*line_index, cursor_position.unwrap_or(0))?;
            }
            ContentChange::LineRemoved { line_index, .. } => {
                self.buffer.merge_with_previous(*line_index)?;
            }
            ContentChange::LineChanged { line_index, changed_content } => {
                self.buffer.replace_line(*line_index, changed_content)?;
            }
            ContentChange::TitleChanged { changed_content } => {
                self.buffer.set_title(changed_content);
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Serialized buffer if there are unflushed edits. Clears `dirty`.
    pub fn take_snapshot(&mut self) -> Option<DocumentContent> {
        if self.status != LoadStatus::Ready || !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.buffer.serialize())
    }
}
