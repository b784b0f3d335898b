//! Queue lifecycle topics.
//!
//! One payload type per event, published only by the manager. Subscribers
//! that track job outcomes (the sync inbox, embedders) key on `job.id`.

use scribe_bus::Topic;
use scribe_types::{DocumentId, ErrorInfo, Job, JobResult};

/// A job entered its queue.
#[derive(Debug, Clone)]
pub struct JobAdded {
    pub job: Job,
}

impl Topic for JobAdded {
    const NAME: &'static str = "queue.job-added";
}

/// A worker picked the job up.
#[derive(Debug, Clone)]
pub struct JobStarted {
    pub job: Job,
}

impl Topic for JobStarted {
    const NAME: &'static str = "queue.job-started";
}

/// The job committed; `result` carries its operations.
#[derive(Debug, Clone)]
pub struct JobCompleted {
    pub job: Job,
    pub result: JobResult,
}

impl Topic for JobCompleted {
    const NAME: &'static str = "queue.job-completed";
}

/// The job failed permanently: retries exhausted or a contract violation.
#[derive(Debug, Clone)]
pub struct JobFailed {
    pub job: Job,
    pub error: ErrorInfo,
}

impl Topic for JobFailed {
    const NAME: &'static str = "queue.job-failed";
}

/// A queue was dropped from the manager, pending jobs included.
#[derive(Debug, Clone)]
pub struct QueueRemoved {
    pub document_id: DocumentId,
    pub scope: String,
}

impl Topic for QueueRemoved {
    const NAME: &'static str = "queue.queue-removed";
}
