//! In-memory storage for tests and embedded use.

use crate::document_store::DocumentStorage;
use crate::error::{StorageError, StorageResult};
use crate::operation_store::{OperationFilter, OperationStorage};
use async_trait::async_trait;
use scribe_types::{Document, DocumentId, Operation, PageCursor, Paged};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Operations served per `find` page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Map-backed [`DocumentStorage`] and [`OperationStorage`].
///
/// Snapshots live in a map keyed by document id; the operation log is one
/// vector in commit order, which `find` filters and pages by offset.
#[derive(Debug)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<DocumentId, Document>>,
    log: RwLock<Vec<Operation>>,
    page_size: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// A store serving `find` pages of the given size (lifted to at least
    /// one).
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
            page_size: page_size.max(1),
        }
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    /// Total operations in the log, across all documents.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.log.read().unwrap().len()
    }
}

#[async_trait]
impl DocumentStorage for MemoryStorage {
    async fn get(&self, document_id: DocumentId) -> StorageResult<Document> {
        self.documents
            .read()
            .unwrap()
            .get(&document_id)
            .cloned()
            .ok_or(StorageError::DocumentNotFound(document_id))
    }

    async fn exists(&self, document_id: DocumentId) -> StorageResult<bool> {
        Ok(self.documents.read().unwrap().contains_key(&document_id))
    }

    async fn create(&self, document: Document) -> StorageResult<()> {
        let mut documents = self.documents.write().unwrap();
        let document_id = document.header.id;
        if documents.contains_key(&document_id) {
            return Err(StorageError::DocumentAlreadyExists(document_id));
        }

        debug!(
            document_id = %document_id,
            document_type = %document.header.document_type,
            "document created"
        );
        documents.insert(document_id, document);
        Ok(())
    }
}

#[async_trait]
impl OperationStorage for MemoryStorage {
    async fn add_operations(
        &self,
        document_id: DocumentId,
        operations: Vec<Operation>,
        updated_document: &Document,
    ) -> StorageResult<()> {
        // Snapshot and log move under the same write path. Replicated
        // documents may land here before any create() call; the snapshot
        // upsert covers both cases.
        let mut documents = self.documents.write().unwrap();
        let mut log = self.log.write().unwrap();

        debug!(
            document_id = %document_id,
            count = operations.len(),
            "operations appended"
        );
        log.extend(operations);
        documents.insert(document_id, updated_document.clone());
        Ok(())
    }

    async fn find(
        &self,
        filter: &OperationFilter,
        cursor: Option<PageCursor>,
    ) -> StorageResult<Paged<Operation>> {
        let offset = match &cursor {
            Some(cursor) => cursor
                .as_str()
                .parse::<usize>()
                .map_err(|_| StorageError::InvalidCursor(cursor.as_str().to_string()))?,
            None => 0,
        };

        let matching: Vec<Operation> = self
            .log
            .read()
            .unwrap()
            .iter()
            .filter(|op| filter.matches(op))
            .cloned()
            .collect();

        let start = offset.min(matching.len());
        let end = (start + self.page_size).min(matching.len());
        let next_cursor = (end < matching.len()).then(|| PageCursor::new(end.to_string()));

        Ok(Paged {
            items: matching[start..end].to_vec(),
            next_cursor,
        })
    }
}
