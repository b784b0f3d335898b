//! Write-path topics shared across crates.
//!
//! Only the executor publishes [`JobWriteReady`]; only the read-model
//! coordinator publishes [`JobReadReady`]. Queue lifecycle topics live with
//! the queue crate.

use crate::Topic;
use scribe_types::{JobId, Operation};

/// Operations from one job are durably written.
#[derive(Debug, Clone)]
pub struct JobWriteReady {
    /// The job that produced the operations.
    pub job_id: JobId,

    /// The committed operations, in append order.
    pub operations: Vec<Operation>,

    /// The sync remote the job's payload came from, for inbox loads.
    /// Lets the sync layer avoid echoing a remote's operations back to it.
    pub source_remote: Option<String>,
}

impl Topic for JobWriteReady {
    const NAME: &'static str = "job.write-ready";
}

/// Operations from one job are indexed into every read model.
#[derive(Debug, Clone)]
pub struct JobReadReady {
    /// The job whose operations were indexed.
    pub job_id: JobId,

    /// The operations that were indexed, in append order.
    pub operations: Vec<Operation>,
}

impl Topic for JobReadReady {
    const NAME: &'static str = "job.read-ready";
}
