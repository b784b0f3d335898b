//! Document snapshot storage contract.

use crate::error::StorageResult;
use async_trait::async_trait;
use scribe_types::{Document, DocumentId};

/// Reads and creates document snapshots.
///
/// The executor loads through this contract on every job (behind the write
/// cache) and creates documents for document-creation jobs; the queue's
/// delegate uses `exists` to validate incoming jobs. Persistent engines
/// implement it outside the core; [`MemoryStorage`](crate::MemoryStorage)
/// backs tests and embedded use.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Loads the current snapshot of a document.
    async fn get(&self, document_id: DocumentId) -> StorageResult<Document>;

    /// True when a document with this id exists.
    async fn exists(&self, document_id: DocumentId) -> StorageResult<bool>;

    /// Creates a new document from its initial snapshot.
    ///
    /// # Errors
    /// Fails with `DocumentAlreadyExists` when the id is taken.
    async fn create(&self, document: Document) -> StorageResult<()>;
}
