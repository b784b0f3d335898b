//! The execution seam between the queue and the write path.

use async_trait::async_trait;
use scribe_types::{DocumentId, Job, JobResult};

/// Executes jobs on behalf of the queue manager.
///
/// The executor crate adapts its job executor to this trait; tests plug in
/// [`mock::MockDelegate`].
#[async_trait]
pub trait ServerDelegate: Send + Sync {
    /// True when the document already exists in storage.
    async fn exists(&self, document_id: DocumentId) -> anyhow::Result<bool>;

    /// Runs one job to completion.
    ///
    /// A failed [`JobResult`] is retryable; an `Err` is a contract
    /// violation and fails the job permanently.
    async fn process_job(&self, job: Job) -> anyhow::Result<JobResult>;
}

pub mod mock {
    //! A scripted delegate for queue tests.

    use super::ServerDelegate;
    use async_trait::async_trait;
    use scribe_types::{DocumentId, ErrorInfo, Job, JobResult};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records processed jobs in completion order, with switches to delay
    /// execution, fail attempts or break the execution contract.
    #[derive(Default)]
    pub struct MockDelegate {
        processed: Mutex<Vec<Job>>,
        missing: Mutex<HashSet<DocumentId>>,
        fail_attempts: AtomicU32,
        hard_error: bool,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockDelegate {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Sleeps this long inside every `process_job` call.
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Fails the next `attempts` process calls with a retryable result.
        #[must_use]
        pub fn failing_attempts(self, attempts: u32) -> Self {
            self.fail_attempts.store(attempts, Ordering::SeqCst);
            self
        }

        /// Every process call returns a hard error instead of a result.
        #[must_use]
        pub fn with_hard_error(mut self) -> Self {
            self.hard_error = true;
            self
        }

        /// Marks a document as absent for `exists`.
        pub fn mark_missing(&self, document_id: DocumentId) {
            self.missing.lock().unwrap().insert(document_id);
        }

        /// Jobs processed successfully, in completion order.
        #[must_use]
        pub fn processed(&self) -> Vec<Job> {
            self.processed.lock().unwrap().clone()
        }

        /// Highest number of concurrent `process_job` calls observed.
        #[must_use]
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ServerDelegate for MockDelegate {
        async fn exists(&self, document_id: DocumentId) -> anyhow::Result<bool> {
            Ok(!self.missing.lock().unwrap().contains(&document_id))
        }

        async fn process_job(&self, job: Job) -> anyhow::Result<JobResult> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.hard_error {
                anyhow::bail!("delegate contract violation");
            }

            let should_fail = self
                .fail_attempts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Ok(JobResult::failure(
                    job,
                    ErrorInfo::new("injected failure"),
                    Duration::from_millis(1),
                ));
            }

            self.processed.lock().unwrap().push(job.clone());
            Ok(JobResult::success(job, Vec::new(), Duration::from_millis(1)))
        }
    }
}
