//! Job dispatch across per-stream queues.
//!
//! The manager owns every [`DocumentQueue`] plus a global arrival list.
//! Dispatch walks arrivals front to back and skips queues that are
//! blocked, running, dependency-gated or whose document already has a job
//! mid-execution, so same-document jobs serialize while different
//! documents run in parallel up to `max_workers`.

use crate::{
    DocumentQueue, JobAdded, JobCompleted, JobFailed, JobStarted, QueueConfig, QueueError,
    QueueRemoved, QueueResult, ServerDelegate,
};
use rand::Rng;
use scribe_bus::{EventBus, Topic};
use scribe_types::{DocumentId, ErrorInfo, Job, JobId, JobPayload, JobResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

/// Global error sink wired at [`QueueManager::init`]; receives every
/// permanent job failure.
pub type ErrorSink = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

/// Running counters kept while dispatching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs that reached a final outcome.
    pub processed: u64,

    /// Jobs that committed.
    pub succeeded: u64,

    /// Jobs that failed permanently.
    pub failed: u64,

    /// Mean execution time of succeeded jobs.
    pub average_duration: Duration,

    /// Jobs still waiting in queues.
    pub backlog: usize,
}

type QueueKey = (DocumentId, String);

struct EnqueuedJob {
    job_id: JobId,
    document_id: DocumentId,
    scope: String,
}

enum Outcome {
    Completed(JobResult),
    Failed(ErrorInfo),
    /// Stop interrupted a retry backoff; the job went back to its queue.
    Shelved,
}

struct ManagerState {
    queues: HashMap<QueueKey, DocumentQueue>,
    /// Global arrival order; dispatch scans this front to back.
    arrival: Vec<EnqueuedJob>,
    /// Documents with a job mid-execution. One writer per document.
    running_documents: HashSet<DocumentId>,
    /// Finished jobs, success or permanent failure alike, for dependency
    /// clearing.
    completed: HashSet<JobId>,
    delegate: Option<Arc<dyn ServerDelegate>>,
    on_error: Option<ErrorSink>,
    workers: usize,
    paused: bool,
    stopping: bool,
    processed: u64,
    succeeded: u64,
    failed: u64,
    total_duration: Duration,
}

struct ManagerInner {
    config: QueueConfig,
    bus: EventBus,
    state: Mutex<ManagerState>,
    /// Flipped once at stop; wakes retry backoff sleeps.
    shutdown: watch::Sender<bool>,
    /// Notified every time a worker finishes; `stop` waits on it.
    idle: Notify,
}

/// Owns the queues and the worker pool. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<ManagerInner>,
}

impl QueueManager {
    /// Creates a manager publishing lifecycle events on `bus`.
    ///
    /// A zero `max_workers` is lifted to one.
    #[must_use]
    pub fn new(config: QueueConfig, bus: EventBus) -> Self {
        let config = QueueConfig {
            max_workers: config.max_workers.max(1),
            ..config
        };
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                bus,
                state: Mutex::new(ManagerState {
                    queues: HashMap::new(),
                    arrival: Vec::new(),
                    running_documents: HashSet::new(),
                    completed: HashSet::new(),
                    delegate: None,
                    on_error: None,
                    workers: 0,
                    paused: false,
                    stopping: false,
                    processed: 0,
                    succeeded: 0,
                    failed: 0,
                    total_duration: Duration::ZERO,
                }),
                shutdown,
                idle: Notify::new(),
            }),
        }
    }

    /// Wires the delegate that executes jobs and the sink for permanent
    /// failures. Jobs cannot be added before this.
    pub fn init(&self, delegate: Arc<dyn ServerDelegate>, on_error: ErrorSink) {
        let mut state = self.inner.state.lock().unwrap();
        state.delegate = Some(delegate);
        state.on_error = Some(on_error);
        info!(max_workers = self.inner.config.max_workers, "queue manager initialized");
    }

    /// Enqueues a job, assigning it a fresh id.
    ///
    /// The job's `queue_hint` prerequisites become queue dependencies; a
    /// job for a document that does not exist yet is additionally gated
    /// behind that document's pending creation job, when one is queued.
    ///
    /// # Errors
    /// Fails when no delegate is wired, the payload is malformed, or the
    /// target queue is deleted. Enqueueing never rejects for capacity.
    pub async fn add_job(&self, job: Job) -> QueueResult<JobId> {
        let delegate = {
            let state = self.inner.state.lock().unwrap();
            state.delegate.clone().ok_or(QueueError::NoDelegate)?
        };
        validate_payload(&job)?;

        let mut job = job;
        job.id = JobId::new();
        let job_id = job.id;
        let key: QueueKey = (job.document_id, job.scope.clone());

        // Deleted check up front so the caller gets the right error
        // without a storage round-trip.
        {
            let state = self.inner.state.lock().unwrap();
            if state.queues.get(&key).is_some_and(DocumentQueue::is_deleted) {
                return Err(QueueError::QueueDeleted {
                    document_id: job.document_id,
                    scope: job.scope,
                });
            }
        }

        let mut creation_gate = None;
        if !matches!(job.payload, JobPayload::CreateDocument { .. }) {
            match delegate.exists(job.document_id).await {
                Ok(true) => {}
                Ok(false) => {
                    let state = self.inner.state.lock().unwrap();
                    creation_gate = find_creation_job(&state, job.document_id);
                }
                Err(err) => {
                    debug!(
                        document_id = %job.document_id,
                        error = %err,
                        "existence check failed; enqueueing ungated"
                    );
                }
            }
        }

        {
            let mut guard = self.inner.state.lock().unwrap();
            let state = &mut *guard;
            let queue = state
                .queues
                .entry(key)
                .or_insert_with(|| DocumentQueue::new(job.document_id, job.scope.clone()));
            if queue.is_deleted() {
                return Err(QueueError::QueueDeleted {
                    document_id: job.document_id,
                    scope: job.scope,
                });
            }
            for hint in &job.queue_hint {
                if !state.completed.contains(hint) {
                    queue.add_dependency(*hint);
                }
            }
            if let Some(gate) = creation_gate {
                if !state.completed.contains(&gate) {
                    queue.add_dependency(gate);
                }
            }
            queue.add_job(job.clone())?;
            state.arrival.push(EnqueuedJob {
                job_id,
                document_id: job.document_id,
                scope: job.scope.clone(),
            });
        }

        debug!(job_id = %job_id, document_id = %job.document_id, scope = %job.scope, "job added");
        self.emit_event(JobAdded { job }).await;
        self.pump();
        Ok(job_id)
    }

    /// Halts dispatch without dropping pending work.
    pub fn pause(&self) {
        self.inner.state.lock().unwrap().paused = true;
        debug!("queue manager paused");
    }

    /// Resumes dispatch after [`pause`](Self::pause).
    pub fn resume(&self) {
        self.inner.state.lock().unwrap().paused = false;
        debug!("queue manager resumed");
        self.pump();
    }

    /// Stops dispatch. With `graceful`, waits for running jobs to finish;
    /// a retry mid-backoff is requeued instead of slept out. Idempotent.
    pub async fn stop(&self, graceful: bool) {
        let already_stopping = {
            let mut state = self.inner.state.lock().unwrap();
            let already = state.stopping;
            state.stopping = true;
            already
        };
        if !already_stopping {
            info!(graceful, "queue manager stopping");
            self.inner.shutdown.send_replace(true);
        }

        if graceful {
            loop {
                let notified = self.inner.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.inner.state.lock().unwrap().workers == 0 {
                    break;
                }
                notified.await;
            }
        }
    }

    /// Drops one queue and its pending jobs. Returns whether it existed.
    pub async fn remove_queue(&self, document_id: DocumentId, scope: &str) -> bool {
        let removed = {
            let mut guard = self.inner.state.lock().unwrap();
            let state = &mut *guard;
            let removed = state
                .queues
                .remove(&(document_id, scope.to_string()))
                .is_some();
            if removed {
                state
                    .arrival
                    .retain(|entry| !(entry.document_id == document_id && entry.scope == scope));
            }
            removed
        };
        if removed {
            info!(document_id = %document_id, scope, "queue removed");
            self.emit_event(QueueRemoved {
                document_id,
                scope: scope.to_string(),
            })
            .await;
        }
        removed
    }

    /// Drops every queue of one document.
    pub async fn remove_document_queues(&self, document_id: DocumentId) {
        let scopes: Vec<String> = {
            let state = self.inner.state.lock().unwrap();
            state
                .queues
                .keys()
                .filter(|(id, _)| *id == document_id)
                .map(|(_, scope)| scope.clone())
                .collect()
        };
        for scope in scopes {
            self.remove_queue(document_id, &scope).await;
        }
    }

    /// Sets the explicit block flag on one queue, creating it when absent.
    pub fn set_queue_blocked(&self, document_id: DocumentId, scope: &str, blocked: bool) {
        self.with_queue(document_id, scope, |queue| queue.set_blocked(blocked));
        if !blocked {
            self.pump();
        }
    }

    /// Marks one queue deleted (or restores it), creating it when absent.
    /// Deleted queues reject `add_job` and never dispatch.
    pub fn set_queue_deleted(&self, document_id: DocumentId, scope: &str, deleted: bool) {
        self.with_queue(document_id, scope, |queue| queue.set_deleted(deleted));
        if !deleted {
            self.pump();
        }
    }

    /// Number of jobs waiting in one queue.
    #[must_use]
    pub fn queue_size(&self, document_id: DocumentId, scope: &str) -> usize {
        let state = self.inner.state.lock().unwrap();
        state
            .queues
            .get(&(document_id, scope.to_string()))
            .map_or(0, DocumentQueue::amount_of_jobs)
    }

    /// Jobs waiting in one queue, in dispatch order.
    #[must_use]
    pub fn pending_jobs(&self, document_id: DocumentId, scope: &str) -> Vec<Job> {
        let state = self.inner.state.lock().unwrap();
        state
            .queues
            .get(&(document_id, scope.to_string()))
            .map_or_else(Vec::new, |queue| queue.jobs().cloned().collect())
    }

    /// A snapshot of the running counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().unwrap();
        let backlog = state.queues.values().map(DocumentQueue::amount_of_jobs).sum();
        let average_duration = if state.succeeded > 0 {
            let succeeded = u32::try_from(state.succeeded).unwrap_or(u32::MAX);
            state.total_duration / succeeded
        } else {
            Duration::ZERO
        };
        QueueStats {
            processed: state.processed,
            succeeded: state.succeeded,
            failed: state.failed,
            average_duration,
            backlog,
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Dispatches as many jobs as free workers allow. Never blocks.
    fn pump(&self) {
        loop {
            let dispatch = {
                let mut guard = self.inner.state.lock().unwrap();
                let state = &mut *guard;
                if state.stopping || state.paused || state.workers >= self.inner.config.max_workers
                {
                    None
                } else if let Some(delegate) = state.delegate.clone() {
                    next_dispatch(state).map(|(key, job)| (key, job, delegate))
                } else {
                    None
                }
            };
            let Some((key, job, delegate)) = dispatch else {
                return;
            };
            let manager = self.clone();
            tokio::spawn(async move {
                manager.run_job(key, job, delegate).await;
            });
        }
    }

    async fn run_job(&self, key: QueueKey, mut job: Job, delegate: Arc<dyn ServerDelegate>) {
        debug!(job_id = %job.id, document_id = %job.document_id, scope = %job.scope, "job started");
        self.emit_event(JobStarted { job: job.clone() }).await;

        let mut shutdown = self.inner.shutdown.subscribe();
        let outcome = loop {
            match delegate.process_job(job.clone()).await {
                Ok(result) if result.success => break Outcome::Completed(result),
                Ok(result) => {
                    let error = result
                        .error
                        .unwrap_or_else(|| ErrorInfo::new("job failed without a recorded error"));
                    job.error_history.push(error.clone());
                    if job.retry_count >= job.max_retries {
                        break Outcome::Failed(error);
                    }
                    job.retry_count += 1;
                    let delay = self.retry_delay(job.retry_count);
                    warn!(
                        job_id = %job.id,
                        retry = job.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %error.message,
                        "job failed; retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => break Outcome::Shelved,
                    }
                }
                Err(err) => {
                    let error = ErrorInfo::new(err.to_string());
                    job.error_history.push(error.clone());
                    break Outcome::Failed(error);
                }
            }
        };

        match outcome {
            Outcome::Completed(mut result) => {
                // The local copy carries the retry bookkeeping.
                result.job = job.clone();
                self.finish(&key, &job, true, result.duration);
                debug!(
                    job_id = %job.id,
                    duration_ms = result.duration.as_millis() as u64,
                    "job completed"
                );
                self.emit_event(JobCompleted { job, result }).await;
            }
            Outcome::Failed(error) => {
                self.finish(&key, &job, false, Duration::ZERO);
                warn!(job_id = %job.id, error = %error.message, "job failed permanently");
                let sink = self.inner.state.lock().unwrap().on_error.clone();
                if let Some(sink) = sink {
                    sink(anyhow::anyhow!("job {} failed: {}", job.id, error.message));
                }
                self.emit_event(JobFailed { job, error }).await;
            }
            Outcome::Shelved => {
                let mut guard = self.inner.state.lock().unwrap();
                let state = &mut *guard;
                if let Some(queue) = state.queues.get_mut(&key) {
                    queue.set_running(false);
                    queue.push_front(job.clone());
                }
                state.running_documents.remove(&key.0);
                state.workers -= 1;
                drop(guard);
                debug!(job_id = %job.id, "stop interrupted retry backoff; job requeued");
                self.inner.idle.notify_waiters();
            }
        }

        self.pump();
    }

    /// Final bookkeeping for one job: clears running marks, records the
    /// outcome, unblocks dependents.
    fn finish(&self, key: &QueueKey, job: &Job, succeeded: bool, duration: Duration) {
        let mut guard = self.inner.state.lock().unwrap();
        let state = &mut *guard;
        if let Some(queue) = state.queues.get_mut(key) {
            queue.set_running(false);
        }
        state.running_documents.remove(&key.0);
        state.completed.insert(job.id);
        state.arrival.retain(|entry| entry.job_id != job.id);
        for queue in state.queues.values_mut() {
            queue.remove_dependency(job.id);
        }
        state.workers -= 1;
        state.processed += 1;
        if succeeded {
            state.succeeded += 1;
            state.total_duration += duration;
        } else {
            state.failed += 1;
        }
        drop(guard);
        self.inner.idle.notify_waiters();
    }

    /// Exponential backoff with 10% jitter, capped at the configured max.
    fn retry_delay(&self, retry_count: u32) -> Duration {
        let shift = retry_count.saturating_sub(1).min(31);
        let base = self.inner.config.retry_base_delay.as_millis() as u64;
        let exponential = base.saturating_mul(1_u64 << shift);
        let jitter = (rand::thread_rng().r#gen::<f64>() * 0.1 * exponential as f64) as u64;
        let cap = self.inner.config.retry_max_delay.as_millis() as u64;
        Duration::from_millis(exponential.saturating_add(jitter).min(cap))
    }

    async fn emit_event<T: Topic>(&self, payload: T) {
        if let Err(err) = self.inner.bus.emit(payload).await {
            debug!(topic = T::NAME, error = %err, "queue event delivery failed");
        }
    }

    fn with_queue(&self, document_id: DocumentId, scope: &str, f: impl FnOnce(&mut DocumentQueue)) {
        let mut state = self.inner.state.lock().unwrap();
        let queue = state
            .queues
            .entry((document_id, scope.to_string()))
            .or_insert_with(|| DocumentQueue::new(document_id, scope));
        f(queue);
    }
}

/// Walks arrivals in order and pops the first dispatchable head job,
/// marking its queue and document as running.
fn next_dispatch(state: &mut ManagerState) -> Option<(QueueKey, Job)> {
    let mut skipped: HashSet<QueueKey> = HashSet::new();
    let mut chosen: Option<QueueKey> = None;

    for entry in &state.arrival {
        let key: QueueKey = (entry.document_id, entry.scope.clone());
        if skipped.contains(&key) {
            continue;
        }
        let Some(queue) = state.queues.get(&key) else {
            continue;
        };
        if queue.is_deleted()
            || queue.is_blocked()
            || queue.is_running()
            || state.running_documents.contains(&entry.document_id)
        {
            skipped.insert(key);
            continue;
        }
        match queue.next_job() {
            Some(head) if head.id == entry.job_id => {
                chosen = Some(key);
                break;
            }
            Some(_) => {
                warn!(job_id = %entry.job_id, "arrival entry is not at the head of its queue");
                continue;
            }
            None => {
                skipped.insert(key);
                continue;
            }
        }
    }

    let key = chosen?;
    let queue = state.queues.get_mut(&key)?;
    let job = queue.pop_job()?;
    queue.set_running(true);
    state.running_documents.insert(key.0);
    state.workers += 1;
    Some((key, job))
}

/// A pending document-creation job for this document, if one is queued.
fn find_creation_job(state: &ManagerState, document_id: DocumentId) -> Option<JobId> {
    state
        .queues
        .values()
        .filter(|queue| queue.document_id() == document_id)
        .flat_map(|queue| queue.jobs())
        .find(|job| matches!(job.payload, JobPayload::CreateDocument { .. }))
        .map(|job| job.id)
}

fn validate_payload(job: &Job) -> QueueResult<()> {
    match &job.payload {
        JobPayload::Actions(actions) => {
            if actions.is_empty() {
                return Err(QueueError::Validation("job has no actions".to_string()));
            }
            if actions.iter().any(|action| action.scope != job.scope) {
                return Err(QueueError::Validation(
                    "job has actions outside its scope".to_string(),
                ));
            }
        }
        JobPayload::Operations(operations) => {
            if operations.is_empty() {
                return Err(QueueError::Validation("job has no operations".to_string()));
            }
            if operations
                .iter()
                .any(|op| op.scope().is_some_and(|scope| scope != job.scope))
            {
                return Err(QueueError::Validation(
                    "job has operations outside its scope".to_string(),
                ));
            }
        }
        JobPayload::CreateDocument { .. } => {}
    }
    Ok(())
}
