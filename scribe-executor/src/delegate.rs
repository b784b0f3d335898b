//! Adapter wiring the executor behind the queue's delegate seam.

use crate::JobExecutor;
use async_trait::async_trait;
use scribe_queue::ServerDelegate;
use scribe_storage::DocumentStorage;
use scribe_types::{DocumentId, Job, JobResult};
use std::sync::Arc;

/// Serves the queue manager: the executor processes jobs, document
/// storage answers existence checks.
///
/// Hard executor errors propagate as errors, so the queue fails the job
/// immediately instead of burning retries on it.
pub struct ExecutorDelegate {
    executor: Arc<JobExecutor>,
    documents: Arc<dyn DocumentStorage>,
}

impl ExecutorDelegate {
    #[must_use]
    pub fn new(executor: Arc<JobExecutor>, documents: Arc<dyn DocumentStorage>) -> Self {
        Self {
            executor,
            documents,
        }
    }
}

#[async_trait]
impl ServerDelegate for ExecutorDelegate {
    async fn exists(&self, document_id: DocumentId) -> anyhow::Result<bool> {
        Ok(self.documents.exists(document_id).await?)
    }

    async fn process_job(&self, job: Job) -> anyhow::Result<JobResult> {
        Ok(self.executor.execute_job(job).await?)
    }
}
