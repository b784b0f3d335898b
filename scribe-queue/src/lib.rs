//! Per-document job queues and dispatch.
//!
//! Callers enqueue [`Job`]s through the [`QueueManager`]; a pool of workers
//! pulls them back out, one writer per document, and hands them to the
//! [`ServerDelegate`] for execution. Failed jobs retry with exponential
//! backoff until their budget runs out. Queue lifecycle is published on
//! the bus as typed topics.
//!
//! [`Job`]: scribe_types::Job

mod config;
pub mod delegate;
mod error;
mod manager;
mod queue;
mod topics;

pub use config::QueueConfig;
pub use delegate::ServerDelegate;
pub use error::{QueueError, QueueResult};
pub use manager::{ErrorSink, QueueManager, QueueStats};
pub use queue::DocumentQueue;
pub use topics::{JobAdded, JobCompleted, JobFailed, JobStarted, QueueRemoved};
