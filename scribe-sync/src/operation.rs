//! Transfer state machines.
//!
//! A [`SyncOperation`] tracks one batch of operations moving between the
//! local log and a remote; a [`JobHandle`] tracks one pushed strand from
//! the transport's point of view. Both walk [`SyncOperationStatus`], but
//! they enforce it differently: a transfer only moves forward, a handle
//! mirrors whatever the transport last reported.

use crate::error::{AggregateError, ChannelError};
use scribe_types::{DocumentId, JobId, Operation, SyncOperationId};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Lifecycle of one transfer, in strictly increasing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncOperationStatus {
    /// Created; nothing has happened yet.
    #[default]
    Unknown,

    /// Handed to the transport, not yet acknowledged.
    TransportPending,

    /// Acknowledged by the transport, waiting for execution.
    ExecutionPending,

    /// Executed; the transfer is done.
    Applied,

    /// Failed; the recorded error is final.
    Error,
}

impl SyncOperationStatus {
    /// True for `Applied` and `Error`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Error)
    }
}

impl fmt::Display for SyncOperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Unknown => "unknown",
            Self::TransportPending => "transport-pending",
            Self::ExecutionPending => "execution-pending",
            Self::Applied => "applied",
            Self::Error => "error",
        };
        write!(f, "{status}")
    }
}

#[derive(Default)]
struct MachineState {
    status: SyncOperationStatus,
    error: Option<ChannelError>,
}

type SyncListener = Arc<
    dyn Fn(&SyncOperation, SyncOperationStatus, SyncOperationStatus) -> anyhow::Result<()>
        + Send
        + Sync,
>;

/// One transfer of operations between the local log and a remote.
///
/// The status only moves forward in [`SyncOperationStatus`] order: a
/// transition to the current or an earlier status is a silent no-op and
/// notifies nobody. Skipping ahead is allowed, and `Error` outranks
/// `Applied`, so a failure reported after an apply still lands while an
/// apply reported after a failure is dropped.
pub struct SyncOperation {
    /// Unique id of this transfer.
    pub id: SyncOperationId,

    /// The remote this transfer belongs to.
    pub remote_name: String,

    /// The document the operations belong to.
    pub document_id: DocumentId,

    /// Scopes covered by the transfer. Strand-built transfers carry
    /// exactly one.
    pub scopes: Vec<String>,

    /// The branch the operations apply on.
    pub branch: String,

    /// The operations being transferred, in log order.
    pub operations: Vec<Operation>,

    /// Jobs that must complete before this transfer may be applied.
    pub job_dependencies: Vec<JobId>,

    state: Mutex<MachineState>,
    listeners: Mutex<Vec<SyncListener>>,
}

impl SyncOperation {
    /// A fresh transfer in `Unknown` status.
    #[must_use]
    pub fn new(
        remote_name: impl Into<String>,
        document_id: DocumentId,
        scopes: Vec<String>,
        branch: impl Into<String>,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            id: SyncOperationId::new(),
            remote_name: remote_name.into(),
            document_id,
            scopes,
            branch: branch.into(),
            operations,
            job_dependencies: Vec::new(),
            state: Mutex::new(MachineState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Gates the transfer behind prerequisite jobs.
    #[must_use]
    pub fn with_job_dependencies(mut self, dependencies: Vec<JobId>) -> Self {
        self.job_dependencies = dependencies;
        self
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> SyncOperationStatus {
        self.state.lock().unwrap().status
    }

    /// The first failure recorded against this transfer, when any.
    #[must_use]
    pub fn error(&self) -> Option<ChannelError> {
        self.state.lock().unwrap().error.clone()
    }

    /// Registers a status listener.
    ///
    /// Listeners run synchronously inside the transition, in registration
    /// order, and only for transitions after they were registered.
    pub fn on<F>(&self, listener: F)
    where
        F: Fn(&SyncOperation, SyncOperationStatus, SyncOperationStatus) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.listeners.lock().unwrap().push(Arc::new(listener));
    }

    /// Marks the transfer handed to the transport.
    pub fn started(&self) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::TransportPending, None)
    }

    /// Marks the transfer acknowledged by the transport.
    pub fn transported(&self) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::ExecutionPending, None)
    }

    /// Marks the transfer executed.
    pub fn executed(&self) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::Applied, None)
    }

    /// Records a terminal failure.
    pub fn failed(&self, error: ChannelError) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::Error, Some(error))
    }

    fn transition(
        &self,
        next: SyncOperationStatus,
        error: Option<ChannelError>,
    ) -> Result<(), AggregateError> {
        let prev = {
            let mut state = self.state.lock().unwrap();
            if next <= state.status {
                return Ok(());
            }
            let prev = state.status;
            state.status = next;
            if let Some(error) = error {
                state.error = Some(error);
            }
            prev
        };

        // Snapshot so a listener can register another listener or walk a
        // mailbox without deadlocking.
        let listeners: Vec<SyncListener> = self.listeners.lock().unwrap().clone();
        let mut failures = Vec::new();
        for listener in listeners {
            if let Err(err) = listener(self, prev, next) {
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError { errors: failures })
        }
    }
}

impl fmt::Debug for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOperation")
            .field("id", &self.id)
            .field("remote_name", &self.remote_name)
            .field("document_id", &self.document_id)
            .field("status", &self.status())
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}

type HandleListener = Arc<
    dyn Fn(&JobHandle, SyncOperationStatus, SyncOperationStatus) -> anyhow::Result<()>
        + Send
        + Sync,
>;

/// Tracker for one pushed strand, from the transport's side.
///
/// Unlike [`SyncOperation`] there is no ordering guard: the transport is
/// the only writer and every call overwrites the status and notifies
/// listeners, same-status and backward moves included.
pub struct JobHandle {
    /// Unique id of this push.
    pub id: SyncOperationId,

    /// The remote the strand was pushed to.
    pub remote_name: String,

    /// The document the operations belong to.
    pub document_id: DocumentId,

    /// Scopes covered by the push.
    pub scopes: Vec<String>,

    /// The branch the operations apply on.
    pub branch: String,

    /// The operations that were pushed, in log order.
    pub operations: Vec<Operation>,

    state: Mutex<MachineState>,
    listeners: Mutex<Vec<HandleListener>>,
}

impl JobHandle {
    /// A fresh handle in `Unknown` status.
    #[must_use]
    pub fn new(
        remote_name: impl Into<String>,
        document_id: DocumentId,
        scopes: Vec<String>,
        branch: impl Into<String>,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            id: SyncOperationId::new(),
            remote_name: remote_name.into(),
            document_id,
            scopes,
            branch: branch.into(),
            operations,
            state: Mutex::new(MachineState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The status the transport last reported.
    #[must_use]
    pub fn status(&self) -> SyncOperationStatus {
        self.state.lock().unwrap().status
    }

    /// The most recent failure the transport reported, when any.
    #[must_use]
    pub fn error(&self) -> Option<ChannelError> {
        self.state.lock().unwrap().error.clone()
    }

    /// Registers a status listener.
    pub fn on<F>(&self, listener: F)
    where
        F: Fn(&JobHandle, SyncOperationStatus, SyncOperationStatus) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.listeners.lock().unwrap().push(Arc::new(listener));
    }

    /// Reports the strand handed to the transport.
    pub fn started(&self) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::TransportPending, None)
    }

    /// Reports the strand acknowledged by the transport.
    pub fn transported(&self) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::ExecutionPending, None)
    }

    /// Reports the strand applied by the remote.
    pub fn executed(&self) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::Applied, None)
    }

    /// Reports a failure.
    pub fn failed(&self, error: ChannelError) -> Result<(), AggregateError> {
        self.transition(SyncOperationStatus::Error, Some(error))
    }

    fn transition(
        &self,
        next: SyncOperationStatus,
        error: Option<ChannelError>,
    ) -> Result<(), AggregateError> {
        let prev = {
            let mut state = self.state.lock().unwrap();
            let prev = state.status;
            state.status = next;
            if let Some(error) = error {
                state.error = Some(error);
            }
            prev
        };

        let listeners: Vec<HandleListener> = self.listeners.lock().unwrap().clone();
        let mut failures = Vec::new();
        for listener in listeners {
            if let Err(err) = listener(self, prev, next) {
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError { errors: failures })
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("remote_name", &self.remote_name)
            .field("document_id", &self.document_id)
            .field("status", &self.status())
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}
