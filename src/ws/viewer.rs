use tokio::sync::mpsc::{error::TrySendError, Sender};
use tracing::warn;
use uuid::Uuid;

use crate::models::{DocumentId, WsEvent};

/// Frames that may wait for one viewer's socket before it counts as gone.
pub const OUTBOUND_CAPACITY: usize = 256;

/// One live viewer connection. The socket writer task owns the receiving
/// half of `outbound`; once it stops or falls `OUTBOUND_CAPACITY` frames
/// behind, every send here fails.
#[derive(Clone, Debug)]
pub struct Viewer {
    pub id: Uuid,
    pub name: String,
    pub doc_id: DocumentId,
    outbound: Sender<String>,
}

impl Viewer {
    pub fn new(doc_id: DocumentId, name: &str, outbound: Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            doc_id,
            outbound,
        }
    }

    /// Queue a raw text frame. Returns false when the connection is gone
    /// or not keeping up.
    pub fn send_text(&self, text: &str) -> bool {
        match self.outbound.try_send(text.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Viewer '{}' on document {} is not reading, dropping it", self.name, self.doc_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn send_event(&self, event: &WsEvent) -> bool {
        self.send_text(&event.to_text())
    }
}
