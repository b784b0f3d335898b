//! A FIFO queue of jobs for one (document, scope) stream.

use crate::{QueueError, QueueResult};
use scribe_types::{DocumentId, Job, JobId};
use std::collections::VecDeque;

/// FIFO job queue for one document scope.
///
/// The queue is passive bookkeeping: flags and dependencies gate dispatch,
/// and the surrounding manager decides when to pop. `next_job` only peeks;
/// a job leaves the queue at dispatch, not before.
#[derive(Debug, Clone)]
pub struct DocumentQueue {
    document_id: DocumentId,
    scope: String,
    jobs: VecDeque<Job>,
    dependencies: Vec<JobId>,
    blocked: bool,
    running: bool,
    deleted: bool,
}

impl DocumentQueue {
    /// Creates an empty queue for one document scope.
    #[must_use]
    pub fn new(document_id: DocumentId, scope: impl Into<String>) -> Self {
        Self {
            document_id,
            scope: scope.into(),
            jobs: VecDeque::new(),
            dependencies: Vec::new(),
            blocked: false,
            running: false,
            deleted: false,
        }
    }

    /// The document this queue serves.
    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// The scope this queue serves.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Appends a job.
    ///
    /// # Errors
    /// A deleted queue accepts nothing.
    pub fn add_job(&mut self, job: Job) -> QueueResult<()> {
        if self.deleted {
            return Err(QueueError::QueueDeleted {
                document_id: self.document_id,
                scope: self.scope.clone(),
            });
        }
        self.jobs.push_back(job);
        Ok(())
    }

    /// The job that would run next. Peeking never removes.
    #[must_use]
    pub fn next_job(&self) -> Option<&Job> {
        self.jobs.front()
    }

    /// Removes and returns the head job at dispatch.
    pub(crate) fn pop_job(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    /// Puts a job back at the head, ahead of everything pending.
    pub(crate) fn push_front(&mut self, job: Job) {
        self.jobs.push_front(job);
    }

    /// Number of pending jobs.
    #[must_use]
    pub fn amount_of_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Pending jobs in dispatch order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// True while the queue must not dispatch: explicitly blocked or gated
    /// behind unfinished dependencies.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked || !self.dependencies.is_empty()
    }

    /// Sets the explicit block flag. Dependencies gate independently.
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    /// True while a job from this queue is mid-execution.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// True once the queue's document scope was deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// Gates the whole queue until `job_id` finishes. Duplicates are
    /// ignored.
    pub fn add_dependency(&mut self, job_id: JobId) {
        if !self.dependencies.contains(&job_id) {
            self.dependencies.push(job_id);
        }
    }

    /// Clears one dependency. Returns whether it was present.
    pub fn remove_dependency(&mut self, job_id: JobId) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|dep| *dep != job_id);
        self.dependencies.len() != before
    }

    /// Unfinished jobs this queue waits on.
    #[must_use]
    pub fn dependencies(&self) -> &[JobId] {
        &self.dependencies
    }
}
