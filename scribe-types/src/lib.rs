//! Core type definitions for Scribe.
//!
//! This crate defines the fundamental, model-agnostic types used throughout
//! the write/replication core:
//! - Identifiers (UUID v7) for documents, jobs, operations, actions,
//!   remotes, processors and sync transfers
//! - Actions (intent) and Operations (committed history)
//! - Documents: header, per-scope state, per-scope operation logs
//! - Jobs and job results
//! - Cursor paging with cooperative abort
//!
//! Document models themselves (reducers, state schemas) are registered by
//! embedders; nothing here knows what a document's state means.

mod action;
mod document;
mod ids;
mod job;
mod operation;
mod paging;
mod timestamp;

pub use action::{Action, ActionKind, CREATE_DOCUMENT, DELETE_DOCUMENT};
pub use document::{Document, DocumentHeader, DocumentState};
pub use ids::{ActionId, DocumentId, JobId, OperationId, ProcessorId, RemoteId, SyncOperationId};
pub use job::{DEFAULT_MAX_RETRIES, ErrorInfo, Job, JobPayload, JobResult};
pub use operation::{Operation, OperationContext};
pub use paging::{AbortHandle, PageCursor, Paged, PagingError, collect_all_pages};
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid action kind: {0}")]
    InvalidActionKind(String),
}
