//! Storage error types.

use scribe_types::DocumentId;
use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors raised by storage contracts.
///
/// Storage failures on the executor's write path come back inside a failed
/// `JobResult` so callers can retry; they never abort the worker.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("document already exists: {0}")]
    DocumentAlreadyExists(DocumentId),

    #[error("invalid page cursor: {0}")]
    InvalidCursor(String),

    /// Engine-specific failure, carried as text.
    #[error("storage backend: {0}")]
    Backend(String),
}
