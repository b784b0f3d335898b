//! The single write path: one job in, one committed batch of operations out.
//!
//! `execute_job` loads the current document through the write cache, runs
//! the job's payload through the document model's reducer (or synthesizes
//! the lifecycle operation for creation jobs), persists the new trailing
//! operations together with the updated snapshot, and announces the commit
//! on the event bus. Storage, registry and reducer failures come back
//! inside a failed [`JobResult`] so the queue can retry; a reducer that
//! reports success without growing the operation log is a contract
//! violation and surfaces as a hard [`ExecutorError`] instead.

use crate::error::{ExecutorError, ExecutorResult};
use scribe_bus::{EventBus, JobWriteReady};
use scribe_cache::{WriteCache, WriteCacheConfig};
use scribe_registry::DocumentModelRegistry;
use scribe_storage::{DocumentStorage, OperationStorage, StorageResult};
use scribe_types::{
    Action, ActionId, ActionKind, Document, DocumentHeader, DocumentState, ErrorInfo, Job,
    JobPayload, JobResult, Operation, OperationContext, OperationId, Timestamp,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// Executes jobs against document storage.
///
/// One instance serves every worker; same-document exclusivity is the
/// queue's job, so concurrent calls here always target distinct documents.
pub struct JobExecutor {
    documents: Arc<dyn DocumentStorage>,
    operations: Arc<dyn OperationStorage>,
    registry: Arc<DocumentModelRegistry>,
    bus: EventBus,
    cache: Mutex<WriteCache>,
}

impl JobExecutor {
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStorage>,
        operations: Arc<dyn OperationStorage>,
        registry: Arc<DocumentModelRegistry>,
        bus: EventBus,
    ) -> Self {
        Self {
            documents,
            operations,
            registry,
            bus,
            cache: Mutex::new(WriteCache::new(WriteCacheConfig::default())),
        }
    }

    /// Replaces the default write cache sizing.
    #[must_use]
    pub fn with_cache_config(mut self, config: WriteCacheConfig) -> Self {
        self.cache = Mutex::new(WriteCache::new(config));
        self
    }

    /// Executes one job to completion.
    ///
    /// Retryable problems (storage, registry, reducer) come back as
    /// `Ok` with a failed [`JobResult`]; the caller owns retry policy.
    /// Either every operation of the job is persisted or none is.
    ///
    /// # Errors
    /// [`ExecutorError::NoOperationGenerated`] when a reducer reports
    /// success without appending an operation. Retrying cannot fix that,
    /// so it does not come back as a result.
    pub async fn execute_job(&self, job: Job) -> ExecutorResult<JobResult> {
        let started = Instant::now();
        debug!(
            job_id = %job.id,
            document_id = %job.document_id,
            scope = %job.scope,
            "executing job"
        );

        let payload = job.payload.clone();
        let result = match payload {
            JobPayload::Actions(actions) => self.apply_actions(&job, &actions, started).await?,
            JobPayload::Operations(incoming) => self.apply_load(&job, incoming, started).await?,
            JobPayload::CreateDocument {
                header,
                initial_state,
            } => {
                self.apply_create(&job, header, initial_state, started)
                    .await?
            }
        };

        if result.success {
            if !result.operations.is_empty() {
                self.announce_write(&result).await;
            }
            debug!(
                job_id = %job.id,
                operations = result.operations.len(),
                duration = ?result.duration,
                "job committed"
            );
        } else if let Some(error) = &result.error {
            debug!(job_id = %job.id, error = %error.message, "job failed");
        }

        Ok(result)
    }

    /// Runs the job's actions through the reducer, sequentially.
    async fn apply_actions(
        &self,
        job: &Job,
        actions: &[Action],
        started: Instant,
    ) -> ExecutorResult<JobResult> {
        let mut document = match self.load_document(job).await {
            Ok(document) => document,
            Err(err) => return Ok(fail(job, err.to_string(), started)),
        };

        let module = match self.registry.module(&document.header.document_type) {
            Ok(module) => module,
            Err(err) => return Ok(fail(job, err.to_string(), started)),
        };

        let mut committed = Vec::with_capacity(actions.len());
        for action in actions {
            let before = document.operations_for_scope(&action.scope).len();
            document = match module.reducer.apply(&document, action) {
                Ok(updated) => updated,
                Err(err) => {
                    return Ok(fail(
                        job,
                        format!(
                            "reducer failed for {} on document {}: {err}",
                            action.kind, job.document_id
                        ),
                        started,
                    ));
                }
            };

            let Some(operation) = finish_trailing(&mut document, job, &action.scope, before, None)
            else {
                return Err(ExecutorError::NoOperationGenerated {
                    document_id: job.document_id,
                    kind: action.kind.clone(),
                });
            };
            committed.push(operation);
        }

        if let Err(err) = self.persist(job, &committed, &document).await {
            return Ok(fail(
                job,
                format!("failed to persist operations: {err}"),
                started,
            ));
        }

        Ok(JobResult::success(job.clone(), committed, started.elapsed()))
    }

    /// Appends already-sequenced operations from a replica.
    ///
    /// Operations the local log already holds are skipped; an operation
    /// whose slot is taken by a different one fails the whole load with
    /// nothing appended, and the conflict is reported upstream rather
    /// than merged.
    async fn apply_load(
        &self,
        job: &Job,
        mut incoming: Vec<Operation>,
        started: Instant,
    ) -> ExecutorResult<JobResult> {
        if incoming.is_empty() {
            return Ok(fail(job, "load job carries no operations", started));
        }

        let mut document = match self.load_document(job).await {
            Ok(document) => document,
            Err(err) => return Ok(fail(job, err.to_string(), started)),
        };

        let module = match self.registry.module(&document.header.document_type) {
            Ok(module) => module,
            Err(err) => return Ok(fail(job, err.to_string(), started)),
        };

        incoming.sort_by_key(|op| op.index);

        let mut committed = Vec::new();
        for op in incoming {
            match classify(&document, &job.scope, &op) {
                LoadDisposition::Duplicate => {
                    debug!(job_id = %job.id, index = op.index, "duplicate operation skipped");
                    continue;
                }
                LoadDisposition::Conflict { existing } => {
                    return Ok(fail(
                        job,
                        format!(
                            "conflicting operation at index {}: incoming {} vs committed {existing}",
                            op.index, op.id
                        ),
                        started,
                    ));
                }
                LoadDisposition::Gap { expected } => {
                    return Ok(fail(
                        job,
                        format!(
                            "operation at index {} skips past revision {expected}",
                            op.index
                        ),
                        started,
                    ));
                }
                LoadDisposition::Append => {}
            }

            // Replay the action so materialized state keeps up with the log.
            let action = Action {
                id: ActionId::new(),
                kind: op.kind.clone(),
                scope: job.scope.clone(),
                input: op.input.clone(),
                timestamp: op.timestamp,
            };
            let before = document.operations_for_scope(&job.scope).len();
            document = match module.reducer.apply(&document, &action) {
                Ok(updated) => updated,
                Err(err) => {
                    return Ok(fail(
                        job,
                        format!(
                            "reducer failed replaying operation {} at index {}: {err}",
                            op.id, op.index
                        ),
                        started,
                    ));
                }
            };

            let Some(operation) =
                finish_trailing(&mut document, job, &job.scope, before, Some(&op))
            else {
                return Err(ExecutorError::NoOperationGenerated {
                    document_id: job.document_id,
                    kind: op.kind.clone(),
                });
            };
            committed.push(operation);
        }

        if committed.is_empty() {
            debug!(job_id = %job.id, "load contained only known operations");
            return Ok(JobResult::success(job.clone(), Vec::new(), started.elapsed()));
        }

        if let Err(err) = self.persist(job, &committed, &document).await {
            return Ok(fail(
                job,
                format!("failed to persist operations: {err}"),
                started,
            ));
        }

        Ok(JobResult::success(job.clone(), committed, started.elapsed()))
    }

    /// Creates a document and commits its lifecycle operation.
    async fn apply_create(
        &self,
        job: &Job,
        header: DocumentHeader,
        initial_state: DocumentState,
        started: Instant,
    ) -> ExecutorResult<JobResult> {
        if job.document_id != header.id {
            return Ok(fail(
                job,
                format!(
                    "creation job targets document {} but its header names {}",
                    job.document_id, header.id
                ),
                started,
            ));
        }

        let mut document = Document::new(header);
        document.state = initial_state;

        let input = serde_json::json!({
            "header": document.header,
            "initialState": document.state,
        });
        let mut operation = Operation {
            id: OperationId::new(),
            index: 0,
            skip: 0,
            kind: ActionKind::CreateDocument,
            input: input.clone(),
            hash: content_hash(&input),
            timestamp: Timestamp::now(),
            error: None,
            context: None,
        };
        document.append_operation(job.scope.clone(), operation.clone());

        let context = OperationContext {
            document_id: job.document_id,
            document_type: document.header.document_type.clone(),
            scope: job.scope.clone(),
            branch: job.branch.clone(),
            signer: None,
            resulting_state: Some(document.resulting_state()),
        };
        operation.context = Some(context.clone());
        if let Some(last) = document
            .operations
            .get_mut(&job.scope)
            .and_then(|log| log.last_mut())
        {
            last.context = Some(context);
        }

        if let Err(err) = self.documents.create(document.clone()).await {
            return Ok(fail(job, err.to_string(), started));
        }

        if let Err(err) = self.persist(job, std::slice::from_ref(&operation), &document).await {
            return Ok(fail(
                job,
                format!("failed to persist operations: {err}"),
                started,
            ));
        }

        Ok(JobResult::success(
            job.clone(),
            vec![operation],
            started.elapsed(),
        ))
    }

    /// Loads the newest snapshot of the job's stream, through the cache.
    async fn load_document(&self, job: &Job) -> StorageResult<Document> {
        let cached = self
            .cache
            .lock()
            .unwrap()
            .get(job.document_id, &job.scope, &job.branch, None);
        if let Some(document) = cached {
            return Ok(document);
        }

        let document = self.documents.get(job.document_id).await?;
        self.cache.lock().unwrap().put(
            job.document_id,
            &job.scope,
            &job.branch,
            document.header.revision_of(&job.scope),
            document.clone(),
        );
        Ok(document)
    }

    /// Commits operations and snapshot together. A failed write drops the
    /// cached stream so the next load re-reads storage.
    async fn persist(
        &self,
        job: &Job,
        operations: &[Operation],
        document: &Document,
    ) -> StorageResult<()> {
        match self
            .operations
            .add_operations(job.document_id, operations.to_vec(), document)
            .await
        {
            Ok(()) => {
                self.cache.lock().unwrap().put(
                    job.document_id,
                    &job.scope,
                    &job.branch,
                    document.header.revision_of(&job.scope),
                    document.clone(),
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    document_id = %job.document_id,
                    error = %err,
                    "operation write failed"
                );
                self.cache
                    .lock()
                    .unwrap()
                    .invalidate_stream(job.document_id, &job.scope, &job.branch);
                Err(err)
            }
        }
    }

    /// Fire-and-forget write-ready announcement; a broken subscriber never
    /// fails the job.
    async fn announce_write(&self, result: &JobResult) {
        let event = JobWriteReady {
            job_id: result.job.id,
            operations: result.operations.clone(),
            source_remote: result.job.source_remote.clone(),
        };
        if let Err(err) = self.bus.emit(event).await {
            debug!(job_id = %result.job.id, error = %err, "write-ready delivery failed");
        }
    }
}

/// How one incoming operation relates to the committed log.
enum LoadDisposition {
    /// Already in the log with the same identity, or superseded by a skip.
    Duplicate,
    /// The target slot is taken by a different operation.
    Conflict { existing: OperationId },
    /// The operation starts past the end of the log.
    Gap { expected: u64 },
    /// Contiguous with the log; safe to append.
    Append,
}

/// Compares one incoming operation against the committed log.
///
/// `skip` widens what counts as contiguous: an operation covers indices
/// `index - skip ..= index`, so it may land past the current revision as
/// long as its skip reaches back to it.
fn classify(document: &Document, scope: &str, incoming: &Operation) -> LoadDisposition {
    let expected = document.next_index(scope);

    if incoming.index < expected {
        return match document
            .operations_for_scope(scope)
            .iter()
            .rev()
            .find(|op| op.index == incoming.index)
        {
            Some(existing) if existing.id == incoming.id => LoadDisposition::Duplicate,
            Some(existing) => LoadDisposition::Conflict { existing: existing.id },
            // The slot was skipped over; the log has moved past it.
            None => LoadDisposition::Duplicate,
        };
    }

    if incoming.index.saturating_sub(incoming.skip) > expected {
        return LoadDisposition::Gap { expected };
    }

    LoadDisposition::Append
}

/// Stamps provenance onto the operation the reducer just appended and
/// keeps the header revision in step with it.
///
/// For replayed loads, `source` restores the identity and position the
/// originating replica assigned. Returns `None` when the scope's log did
/// not grow past `before`.
fn finish_trailing(
    document: &mut Document,
    job: &Job,
    scope: &str,
    before: usize,
    source: Option<&Operation>,
) -> Option<Operation> {
    if document.operations_for_scope(scope).len() <= before {
        return None;
    }

    if let Some(source) = source {
        let last = document.operations.get_mut(scope)?.last_mut()?;
        last.id = source.id;
        last.index = source.index;
        last.skip = source.skip;
        last.hash = source.hash.clone();
        last.timestamp = source.timestamp;
        last.error = source.error.clone();
    }

    let (index, kind) = {
        let last = document.operations_for_scope(scope).last()?;
        (last.index, last.kind.clone())
    };
    document.header.revision.insert(scope.to_string(), index + 1);

    let resulting_state = kind.is_lifecycle().then(|| document.resulting_state());
    let signer = source
        .and_then(|op| op.context.as_ref())
        .and_then(|context| context.signer.clone());
    let context = OperationContext {
        document_id: job.document_id,
        document_type: document.header.document_type.clone(),
        scope: scope.to_string(),
        branch: job.branch.clone(),
        signer,
        resulting_state,
    };

    let last = document.operations.get_mut(scope)?.last_mut()?;
    last.context = Some(context);
    Some(last.clone())
}

fn fail(job: &Job, message: impl Into<String>, started: Instant) -> JobResult {
    JobResult::failure(job.clone(), ErrorInfo::new(message), started.elapsed())
}

fn content_hash(value: &serde_json::Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
