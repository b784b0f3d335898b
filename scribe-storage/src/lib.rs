//! Storage contracts for Scribe.
//!
//! The core consumes two narrow contracts rather than owning an engine:
//! [`DocumentStorage`] for document snapshots and [`OperationStorage`] for
//! the append-only operation log. Persistent engines implement them outside
//! the core; [`MemoryStorage`] implements both for tests and embedded use.

mod document_store;
mod error;
mod memory;
mod operation_store;

pub use document_store::DocumentStorage;
pub use error::{StorageError, StorageResult};
pub use memory::{DEFAULT_PAGE_SIZE, MemoryStorage};
pub use operation_store::{OperationFilter, OperationStorage};
