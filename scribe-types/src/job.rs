//! Jobs: the unit of queued work against one document stream.

use crate::{
    Action, Document, DocumentHeader, DocumentId, DocumentState, JobId, Operation, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a job asks the executor to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum JobPayload {
    /// Raw intent: run these actions through the document's reducer.
    Actions(Vec<Action>),

    /// Replication load: append these already-sequenced operations.
    Operations(Vec<Operation>),

    /// Create a new document with this header and initial state.
    CreateDocument {
        header: DocumentHeader,
        initial_state: DocumentState,
    },
}

/// A single failure recorded against a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// What went wrong.
    pub message: String,

    /// When it went wrong.
    pub timestamp: Timestamp,
}

impl ErrorInfo {
    /// Records a failure at the current time.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Retry budget a job carries unless overridden.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// The unit of queued work. Immutable once created; retry bookkeeping is
/// tracked by the queue manager on its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, assigned by the queue manager at enqueue.
    pub id: JobId,

    /// The document this job targets.
    pub document_id: DocumentId,

    /// The scope this job mutates.
    pub scope: String,

    /// The branch this job applies on.
    pub branch: String,

    /// What to execute.
    pub payload: JobPayload,

    /// Jobs that must complete before this one may run.
    #[serde(default)]
    pub queue_hint: Vec<JobId>,

    /// How many times this job has been retried.
    #[serde(default)]
    pub retry_count: u32,

    /// Retry budget before the job is failed permanently. Zero disables
    /// retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Every failure this job has seen, oldest first.
    #[serde(default)]
    pub error_history: Vec<ErrorInfo>,

    /// The sync remote the payload came from, for inbox loads.
    /// Used to suppress echoing operations back to their origin.
    #[serde(default)]
    pub source_remote: Option<String>,

    /// When the job was created.
    pub created_at: Timestamp,
}

impl Job {
    /// Creates a job carrying actions for one document stream.
    #[must_use]
    pub fn from_actions(
        document_id: DocumentId,
        scope: impl Into<String>,
        branch: impl Into<String>,
        actions: Vec<Action>,
    ) -> Self {
        Self::new(document_id, scope, branch, JobPayload::Actions(actions))
    }

    /// Creates a replication job carrying already-sequenced operations.
    #[must_use]
    pub fn from_operations(
        document_id: DocumentId,
        scope: impl Into<String>,
        branch: impl Into<String>,
        operations: Vec<Operation>,
    ) -> Self {
        Self::new(document_id, scope, branch, JobPayload::Operations(operations))
    }

    /// Creates a document-creation job.
    #[must_use]
    pub fn create_document(document: &Document) -> Self {
        Self::new(
            document.header.id,
            "global",
            document.header.branch.clone(),
            JobPayload::CreateDocument {
                header: document.header.clone(),
                initial_state: document.state.clone(),
            },
        )
    }

    fn new(
        document_id: DocumentId,
        scope: impl Into<String>,
        branch: impl Into<String>,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: JobId::new(),
            document_id,
            scope: scope.into(),
            branch: branch.into(),
            payload,
            queue_hint: Vec::new(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_history: Vec::new(),
            source_remote: None,
            created_at: Timestamp::now(),
        }
    }

    /// Gates this job behind prerequisite jobs.
    #[must_use]
    pub fn with_queue_hint(mut self, prerequisites: Vec<JobId>) -> Self {
        self.queue_hint = prerequisites;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Marks where the payload came from, for echo suppression.
    #[must_use]
    pub fn with_source_remote(mut self, remote_name: impl Into<String>) -> Self {
        self.source_remote = Some(remote_name.into());
        self
    }
}

/// What the executor reports back for one job.
///
/// A failed result (`success == false`) is retryable; hard contract
/// violations surface as errors instead and never produce a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// The job this result answers.
    pub job: Job,

    /// Whether the job committed its operations.
    pub success: bool,

    /// The operations committed by this job, in append order.
    pub operations: Vec<Operation>,

    /// The failure, when `success` is false.
    pub error: Option<ErrorInfo>,

    /// Wall time the execution took.
    pub duration: Duration,
}

impl JobResult {
    /// A successful result carrying the committed operations.
    #[must_use]
    pub fn success(job: Job, operations: Vec<Operation>, duration: Duration) -> Self {
        Self {
            job,
            success: true,
            operations,
            error: None,
            duration,
        }
    }

    /// A failed, retryable result.
    #[must_use]
    pub fn failure(job: Job, error: ErrorInfo, duration: Duration) -> Self {
        Self {
            job,
            success: false,
            operations: Vec::new(),
            error: Some(error),
            duration,
        }
    }
}
