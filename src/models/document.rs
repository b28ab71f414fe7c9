use serde::{Deserialize, Serialize};

/// Numeric document identifier used by the Document Store.
pub type DocumentId = u64;

/// A document as returned by the Document Store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Document {
    #[serde(default)]
    pub id: Option<DocumentId>,
    pub title: String,
    pub content: String,
}

/// Writable part of a document, sent back to the Document Store on flush.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DocumentContent {
    pub title: String,
    pub content: String,
}

impl From<Document> for DocumentContent {
    fn from(doc: Document) -> Self {
        Self { title: doc.title, content: doc.content }
    }
}
