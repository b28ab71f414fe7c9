pub mod document_store;
pub mod identity;
pub mod memory_store;
