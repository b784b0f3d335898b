//! Executor error types.

use scribe_types::{ActionKind, DocumentId};
use thiserror::Error;

/// Result type alias for executor operations.
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;

/// Hard failures that retrying cannot fix.
///
/// Everything retryable (storage, registry, reducer trouble) comes back
/// inside a failed `JobResult` instead of here.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A reducer reported success without appending a new trailing
    /// operation to the scope it was applied on.
    #[error("reducer produced no operation for {kind} on document {document_id}")]
    NoOperationGenerated {
        document_id: DocumentId,
        kind: ActionKind,
    },
}
