//! Error types for the queue layer.

use scribe_types::DocumentId;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised when enqueueing work.
///
/// Execution failures never surface here; they travel inside failed
/// `JobResult`s and the `job_failed` topic.
#[derive(Debug, Error)]
pub enum QueueError {
    /// `init` has not wired a delegate yet.
    #[error("no server delegate defined")]
    NoDelegate,

    /// The job is malformed: empty payload or actions outside its scope.
    #[error("invalid job: {0}")]
    Validation(String),

    /// The target queue was marked deleted and accepts nothing.
    #[error("queue deleted for document {document_id} scope '{scope}'")]
    QueueDeleted {
        document_id: DocumentId,
        scope: String,
    },
}
