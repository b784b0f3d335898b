//! Operation log storage contract.

use crate::error::StorageResult;
use async_trait::async_trait;
use scribe_types::{Document, DocumentId, Operation, PageCursor, Paged};

/// Selects operations from the log.
///
/// Unset fields match everything. Document, scope and branch live on an
/// operation's context, so operations committed without context never match
/// a filter that sets one of those fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationFilter {
    pub document_id: Option<DocumentId>,
    pub scope: Option<String>,
    pub branch: Option<String>,

    /// Only operations with `index >= from_index`.
    pub from_index: Option<u64>,
}

impl OperationFilter {
    /// A filter that matches every operation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter scoped to one document.
    #[must_use]
    pub fn for_document(document_id: DocumentId) -> Self {
        Self {
            document_id: Some(document_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    #[must_use]
    pub fn from_index(mut self, index: u64) -> Self {
        self.from_index = Some(index);
        self
    }

    /// True when the operation passes every set field.
    #[must_use]
    pub fn matches(&self, operation: &Operation) -> bool {
        if let Some(document_id) = self.document_id {
            if operation.document_id() != Some(document_id) {
                return false;
            }
        }
        if let Some(scope) = &self.scope {
            if operation.scope() != Some(scope.as_str()) {
                return false;
            }
        }
        if let Some(branch) = &self.branch {
            if operation.branch() != Some(branch.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from_index {
            if operation.index < from {
                return false;
            }
        }
        true
    }
}

/// Appends committed operations and serves paged reads over the log.
#[async_trait]
pub trait OperationStorage: Send + Sync {
    /// Atomically appends operations and replaces the stored snapshot.
    ///
    /// Log append and snapshot upsert land together or not at all; a
    /// failure leaves the previous snapshot readable.
    async fn add_operations(
        &self,
        document_id: DocumentId,
        operations: Vec<Operation>,
        updated_document: &Document,
    ) -> StorageResult<()>;

    /// One page of operations matching the filter, in commit order.
    ///
    /// Walk [`Paged::next_cursor`] for the rest; `collect_all_pages` does
    /// so with an abort check between pages.
    async fn find(
        &self,
        filter: &OperationFilter,
        cursor: Option<PageCursor>,
    ) -> StorageResult<Paged<Operation>>;
}
