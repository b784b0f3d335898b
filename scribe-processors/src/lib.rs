//! Operation routing: read models, drive-scoped processors and the
//! coordinator that feeds them.
//!
//! The write path commits operations and announces them on the bus; this
//! crate turns those announcements into derived state. A
//! [`ReadModelCoordinator`] subscribes to write-ready events and feeds
//! every registered [`ReadModel`] in commit order. The
//! [`ProcessorManager`] is one such read model: it watches the stream for
//! drive lifecycle, runs [`ProcessorFactory`]s once per drive, and fans
//! operations out to the spawned [`Processor`]s through their
//! [`ProcessorFilter`]s.

mod coordinator;
mod drive;
mod error;
mod filter;
mod manager;
pub mod processor;
mod read_model;

pub use coordinator::ReadModelCoordinator;
pub use drive::{created_header, deleted_document_id};
pub use error::{ProcessorError, ProcessorResult};
pub use filter::{ProcessorFilter, matches_filter};
pub use manager::ProcessorManager;
pub use processor::{Processor, ProcessorFactory, ProcessorRecord};
pub use read_model::ReadModel;
