use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;
use crate::models::{Document, DocumentContent, DocumentId};
use super::document_store::DocumentStore;

#[derive(Debug, Default)]
struct Entry {
    content: Option<DocumentContent>,
    updates: usize,
}

/// In-process Document Store. Used when no `DOCUMENTS_URL` is configured
/// and as the store behind the test suites.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<DocumentId, Entry>>,
    fail_updates: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc_id: DocumentId, doc: Document) {
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        docs.entry(doc_id).or_default().content = Some(doc.into());
    }

    pub fn content(&self, doc_id: DocumentId) -> Option<DocumentContent> {
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        docs.get(&doc_id).and_then(|e| e.content.clone())
    }

    /// Number of successful updates written for `doc_id`.
    pub fn update_count(&self, doc_id: DocumentId) -> usize {
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        docs.get(&doc_id).map_or(0, |e| e.updates)
    }

    /// Make every following update fail, to exercise upstream failures.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_by_id(&self, doc_id: DocumentId) -> Result<Document, StoreError> {
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        match docs.get(&doc_id).and_then(|e| e.content.as_ref()) {
            Some(content) => Ok(Document {
                id: Some(doc_id),
                title: content.title.clone(),
                content: content.content.clone(),
            }),
            None => Err(StoreError::NotFound(doc_id)),
        }
    }

    async fn update(&self, doc_id: DocumentId, content: &DocumentContent) -> Result<(), StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Status { id: doc_id, status: StatusCode::SERVICE_UNAVAILABLE });
        }
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = docs.entry(doc_id).or_default();
        entry.content = Some(content.clone());
        entry.updates += 1;
        Ok(())
    }
}
