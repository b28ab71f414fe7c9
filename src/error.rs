use thiserror::Error;

use crate::models::DocumentId;
use crate::ws::linebuffer::LineBufferError;

/// Failures talking to the Document Store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document {0} not found")]
    NotFound(DocumentId),
    #[error("Document store returned {status} for document {id}")]
    Status { id: DocumentId, status: reqwest::StatusCode },
    #[error("Document store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to sign service token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Failures talking to the Identity Provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider returned {0}")]
    Status(reqwest::StatusCode),
    #[error("Identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to sign service token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Errors raised by the synchronization engine. Everything except the
/// handshake variants is reported to the offending viewer as an `ERROR` event.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Incorrectly formatted message: {0}")]
    Malformed(String),
    #[error("Only CONTENT_CHANGED events are accepted from viewers")]
    UnsupportedEvent,
    #[error(transparent)]
    Buffer(#[from] LineBufferError),
    #[error("Document is still loading, too many pending edits")]
    LoadQueueFull,
    #[error("Document {0} could not be loaded")]
    Unavailable(DocumentId),
    #[error("Display name '{0}' is already in use for this document")]
    NameTaken(String),
}
