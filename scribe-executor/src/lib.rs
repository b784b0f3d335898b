//! Job execution for Scribe.
//!
//! The executor is the write path of the pipeline: it turns queued jobs
//! into committed operations by running them through the document model's
//! reducer and persisting operation and snapshot together, then announces
//! every commit on the event bus. [`ExecutorDelegate`] plugs it into the
//! queue manager's delegate seam so a full stack is storage + registry +
//! bus + queue + executor.

mod delegate;
mod error;
mod executor;

pub use delegate::ExecutorDelegate;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::JobExecutor;
