//! The transport seam: channels move transfers between mailboxes and a
//! remote peer.

use crate::error::SyncResult;
use crate::mailbox::Mailbox;
use crate::storage::{RemoteRecord, SyncCursorStorage};
use async_trait::async_trait;
use scribe_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Coarse health of one direction of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Healthy; nothing outstanding.
    #[default]
    Idle,

    /// Recent failures, still retrying.
    Running,

    /// The failure threshold latched; this direction has stopped.
    Error,
}

/// Rolling failure bookkeeping for one direction of a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHealth {
    /// Current coarse state.
    pub state: HealthState,

    /// Failures since the last success.
    pub consecutive_failures: u32,

    /// When the direction last succeeded.
    pub last_success: Option<Timestamp>,

    /// When the direction last failed.
    pub last_failure: Option<Timestamp>,
}

impl ChannelHealth {
    /// A healthy direction with no history.
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// Records a success: the failure streak resets and the state returns
    /// to `Idle`.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_success = Some(Timestamp::now());
        self.state = HealthState::Idle;
    }

    /// Records a failure. At `max_failures` consecutive failures the state
    /// latches to `Error`; only a success before that point resets it.
    pub fn record_failure(&mut self, max_failures: u32) {
        self.consecutive_failures += 1;
        self.last_failure = Some(Timestamp::now());
        self.state = if self.consecutive_failures >= max_failures {
            HealthState::Error
        } else {
            HealthState::Running
        };
    }

    /// True once the failure threshold latched.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state == HealthState::Error
    }
}

/// Health of both directions of one remote's channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatus {
    /// Local to remote.
    pub push: ChannelHealth,

    /// Remote to local.
    pub pull: ChannelHealth,
}

/// Tuning for one remote's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// How often a poll-style channel asks the remote for new strands.
    pub poll_interval: Duration,

    /// Consecutive pull failures after which polling stops.
    pub max_failures: u32,

    /// Most operations bundled into one pushed strand.
    pub batch_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_failures: 5,
            batch_size: 100,
        }
    }
}

/// One remote's transport.
///
/// A channel owns the three mailboxes for its remote. The manager fills
/// the outbox and settles what lands in the inbox; moving transfers across
/// the wire, in either direction, is the channel's business.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Connects and registers this node's pull listener with the remote.
    async fn init(&self) -> SyncResult<()>;

    /// Disconnects. Idempotent; mailbox contents stay inspectable.
    async fn shutdown(&self);

    /// Transfers pulled from the remote, awaiting local execution.
    fn inbox(&self) -> &Mailbox;

    /// Local transfers awaiting push to the remote.
    fn outbox(&self) -> &Mailbox;

    /// Transfers that failed terminally, kept for inspection.
    fn dead_letter(&self) -> &Mailbox;

    /// Health of both directions.
    fn health(&self) -> RemoteStatus;
}

/// Builds the channel for a newly registered or restored remote.
pub trait ChannelFactory: Send + Sync {
    /// Creates the channel for one remote record.
    fn create(
        &self,
        record: &RemoteRecord,
        cursors: Arc<dyn SyncCursorStorage>,
    ) -> Arc<dyn Channel>;
}

pub mod mock {
    //! A loopback channel for tests.
    //!
    //! Strands queued by the test are pulled into the inbox by `poll`;
    //! outbox transfers are pushed into an inspectable log by
    //! `flush_outbox` and settled against a programmable acknowledgement.

    use super::{Channel, ChannelConfig, ChannelFactory, ChannelHealth, RemoteStatus};
    use crate::error::{AggregateError, ChannelError, SyncError, SyncResult};
    use crate::mailbox::Mailbox;
    use crate::operation::JobHandle;
    use crate::protocol::{
        self, ListenerRegistration, ListenerRevision, StrandUpdate, UpdateStatus,
    };
    use crate::storage::{MemorySyncStorage, RemoteRecord, SyncCursor, SyncCursorStorage};
    use async_trait::async_trait;
    use scribe_processors::ProcessorFilter;
    use scribe_types::{RemoteId, Timestamp};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing::{debug, warn};

    #[derive(Default)]
    struct MockState {
        registration: Option<ListenerRegistration>,
        /// Strands the remote holds for us, by remote ordinal.
        pending: Vec<(u64, StrandUpdate)>,
        next_ordinal: u64,
        pushed: Vec<StrandUpdate>,
        handles: Vec<Arc<JobHandle>>,
        ack_status: Option<UpdateStatus>,
        fail_next_poll: bool,
        fail_next_push: bool,
        fail_init: bool,
        shutdown: bool,
        pull: ChannelHealth,
        push: ChannelHealth,
    }

    /// In-memory [`Channel`] with a scripted remote behind it.
    pub struct MockChannel {
        remote_id: RemoteId,
        remote_name: String,
        filter: ProcessorFilter,
        config: ChannelConfig,
        cursors: Arc<dyn SyncCursorStorage>,
        inbox: Mailbox,
        outbox: Mailbox,
        dead_letter: Mailbox,
        state: Mutex<MockState>,
        init_calls: AtomicUsize,
        shutdown_calls: AtomicUsize,
    }

    impl MockChannel {
        /// A healthy channel with its own cursor storage and a wildcard
        /// filter.
        #[must_use]
        pub fn new(remote_name: impl Into<String>) -> Arc<Self> {
            Self::for_remote(
                &RemoteRecord::new(remote_name, ChannelConfig::default(), ProcessorFilter::any()),
                Arc::new(MemorySyncStorage::new()),
            )
        }

        /// A channel whose `init` refuses to connect.
        #[must_use]
        pub fn failing(remote_name: impl Into<String>) -> Arc<Self> {
            let channel = Self::new(remote_name);
            channel.state.lock().unwrap().fail_init = true;
            channel
        }

        /// The channel a [`MockChannelFactory`] builds for one record.
        #[must_use]
        pub fn for_remote(
            record: &RemoteRecord,
            cursors: Arc<dyn SyncCursorStorage>,
        ) -> Arc<Self> {
            Arc::new(Self {
                remote_id: record.id,
                remote_name: record.name.clone(),
                filter: record.filter.clone(),
                config: record.config.clone(),
                cursors,
                inbox: Mailbox::new(),
                outbox: Mailbox::new(),
                dead_letter: Mailbox::new(),
                state: Mutex::new(MockState::default()),
                init_calls: AtomicUsize::new(0),
                shutdown_calls: AtomicUsize::new(0),
            })
        }

        // ── Scripting ────────────────────────────────────────────────

        /// Queues a strand the next `poll` will deliver.
        pub fn queue_incoming(&self, strand: StrandUpdate) {
            let mut state = self.state.lock().unwrap();
            state.next_ordinal += 1;
            let ordinal = state.next_ordinal;
            state.pending.push((ordinal, strand));
        }

        /// The next poll fails with a network error.
        pub fn fail_next_poll(&self) {
            self.state.lock().unwrap().fail_next_poll = true;
        }

        /// The next pushed strand is rejected before acknowledgement.
        pub fn fail_next_push(&self) {
            self.state.lock().unwrap().fail_next_push = true;
        }

        /// Acknowledges future pushes with this status instead of
        /// `SUCCESS`.
        pub fn respond_with(&self, status: UpdateStatus) {
            self.state.lock().unwrap().ack_status = Some(status);
        }

        // ── Inspection ───────────────────────────────────────────────

        /// Strands pushed so far, oldest first.
        #[must_use]
        pub fn pushed_strands(&self) -> Vec<StrandUpdate> {
            self.state.lock().unwrap().pushed.clone()
        }

        /// Handles created for pushes, oldest first.
        #[must_use]
        pub fn push_handles(&self) -> Vec<Arc<JobHandle>> {
            self.state.lock().unwrap().handles.clone()
        }

        /// The pull listener registered at `init`, when any.
        #[must_use]
        pub fn registration(&self) -> Option<ListenerRegistration> {
            self.state.lock().unwrap().registration.clone()
        }

        #[must_use]
        pub fn init_count(&self) -> usize {
            self.init_calls.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn shutdown_count(&self) -> usize {
            self.shutdown_calls.load(Ordering::SeqCst)
        }

        // ── Wire movement ────────────────────────────────────────────

        /// Pulls strands past the stored cursor into the inbox, advancing
        /// the cursor past everything delivered. Returns how many transfers
        /// landed.
        ///
        /// Polling is skipped silently while shut down or once pull health
        /// has latched to `Error`.
        ///
        /// # Errors
        /// Fails on an injected poll failure, a cursor storage failure or
        /// an undecodable strand; every failure counts against pull health.
        pub async fn poll(&self) -> SyncResult<usize> {
            {
                let state = self.state.lock().unwrap();
                if state.shutdown || state.pull.is_stopped() {
                    return Ok(0);
                }
            }
            if self.take_poll_failure() {
                self.record_pull_failure();
                return Err(SyncError::Network("injected poll failure".to_string()));
            }

            let cursor = match self.cursors.get(&self.remote_name).await {
                Ok(cursor) => cursor,
                Err(err) => {
                    self.record_pull_failure();
                    return Err(err);
                }
            };

            let batch: Vec<(u64, StrandUpdate)> = {
                let state = self.state.lock().unwrap();
                state
                    .pending
                    .iter()
                    .filter(|(ordinal, _)| *ordinal > cursor.ordinal)
                    .cloned()
                    .collect()
            };

            let mut delivered = Vec::with_capacity(batch.len());
            let mut max_ordinal = cursor.ordinal;
            for (ordinal, strand) in batch {
                let transfer = match protocol::sync_operation_from_strand(
                    &strand,
                    &self.remote_name,
                ) {
                    Ok(transfer) => transfer,
                    Err(err) => {
                        self.record_pull_failure();
                        return Err(err);
                    }
                };
                log_transition(transfer.transported());
                delivered.push(Arc::new(transfer));
                max_ordinal = max_ordinal.max(ordinal);
            }

            let count = delivered.len();
            if count > 0 {
                self.inbox.add_many(delivered);
                let advanced = SyncCursor {
                    remote_name: self.remote_name.clone(),
                    ordinal: max_ordinal,
                    last_synced_at: Some(Timestamp::now()),
                };
                if let Err(err) = self.cursors.upsert(advanced).await {
                    self.record_pull_failure();
                    return Err(err);
                }
            }
            self.record_pull_success();
            debug!(remote = %self.remote_name, delivered = count, "poll finished");
            Ok(count)
        }

        /// Pushes every outbox transfer to the scripted remote and settles
        /// it against the acknowledged revisions. Returns the
        /// acknowledgements, one per pushed strand.
        ///
        /// Each transfer is chunked to the configured batch size; every
        /// chunk gets its own [`JobHandle`] walked through the push
        /// lifecycle. A transfer whose chunks all come back `SUCCESS` is
        /// executed; anything else fails it into the dead letter box.
        pub async fn flush_outbox(&self) -> Vec<ListenerRevision> {
            if self.state.lock().unwrap().shutdown {
                return Vec::new();
            }

            let mut revisions = Vec::new();
            for sync_op in self.outbox.items() {
                let chunk_size = self.config.batch_size.max(1);
                let scope = sync_op.scopes.first().map_or("global", String::as_str);
                let mut failure: Option<ChannelError> = None;

                for chunk in sync_op.operations.chunks(chunk_size) {
                    let strand = protocol::strand_from_operations(
                        sync_op.document_id,
                        scope,
                        &sync_op.branch,
                        chunk,
                    );
                    let handle = Arc::new(JobHandle::new(
                        sync_op.remote_name.clone(),
                        sync_op.document_id,
                        sync_op.scopes.clone(),
                        sync_op.branch.clone(),
                        chunk.to_vec(),
                    ));
                    log_transition(handle.started());

                    if self.take_push_failure() {
                        let error = ChannelError::outbox("push rejected by transport");
                        log_transition(handle.failed(error.clone()));
                        self.state.lock().unwrap().handles.push(handle);
                        self.record_push_failure();
                        failure = Some(error);
                        break;
                    }

                    log_transition(handle.transported());

                    let status = {
                        let mut state = self.state.lock().unwrap();
                        state.pushed.push(strand);
                        state.handles.push(Arc::clone(&handle));
                        state.ack_status.unwrap_or(UpdateStatus::Success)
                    };
                    let message = (status != UpdateStatus::Success)
                        .then(|| format!("remote acknowledged {status}"));
                    revisions.push(ListenerRevision {
                        drive_id: None,
                        document_id: sync_op.document_id,
                        scope: scope.to_string(),
                        branch: sync_op.branch.clone(),
                        status,
                        revision: chunk.last().map_or(0, |operation| operation.index + 1),
                        error: message.clone(),
                    });

                    match message {
                        None => {
                            log_transition(handle.executed());
                            self.record_push_success();
                        }
                        Some(message) => {
                            let error = ChannelError::outbox(message);
                            log_transition(handle.failed(error.clone()));
                            self.record_push_failure();
                            failure = Some(error);
                            break;
                        }
                    }
                }

                match failure {
                    None => log_transition(sync_op.executed()),
                    Some(error) => {
                        warn!(
                            remote = %self.remote_name,
                            sync_op = %sync_op.id,
                            error = %error,
                            "push failed; transfer dead-lettered"
                        );
                        log_transition(sync_op.failed(error));
                        self.dead_letter.add(Arc::clone(&sync_op));
                    }
                }
                self.outbox.remove(sync_op.id);
            }
            revisions
        }

        fn take_poll_failure(&self) -> bool {
            let mut state = self.state.lock().unwrap();
            std::mem::take(&mut state.fail_next_poll)
        }

        fn take_push_failure(&self) -> bool {
            let mut state = self.state.lock().unwrap();
            std::mem::take(&mut state.fail_next_push)
        }

        fn record_pull_success(&self) {
            self.state.lock().unwrap().pull.record_success();
        }

        fn record_pull_failure(&self) {
            let mut state = self.state.lock().unwrap();
            state.pull.record_failure(self.config.max_failures);
            if state.pull.is_stopped() {
                warn!(
                    remote = %self.remote_name,
                    failures = state.pull.consecutive_failures,
                    "pull failure threshold reached; polling stops"
                );
            }
        }

        fn record_push_success(&self) {
            self.state.lock().unwrap().push.record_success();
        }

        fn record_push_failure(&self) {
            let mut state = self.state.lock().unwrap();
            state.push.record_failure(self.config.max_failures);
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        async fn init(&self) -> SyncResult<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.lock().unwrap();
            if state.fail_init {
                return Err(SyncError::Network(
                    "mock channel refused to connect".to_string(),
                ));
            }
            state.shutdown = false;
            state.registration = Some(ListenerRegistration {
                listener_id: self.remote_id.to_string(),
                filter: self.filter.clone(),
            });
            debug!(remote = %self.remote_name, "mock channel connected");
            Ok(())
        }

        async fn shutdown(&self) {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            self.state.lock().unwrap().shutdown = true;
            debug!(remote = %self.remote_name, "mock channel shut down");
        }

        fn inbox(&self) -> &Mailbox {
            &self.inbox
        }

        fn outbox(&self) -> &Mailbox {
            &self.outbox
        }

        fn dead_letter(&self) -> &Mailbox {
            &self.dead_letter
        }

        fn health(&self) -> RemoteStatus {
            let state = self.state.lock().unwrap();
            RemoteStatus {
                push: state.push.clone(),
                pull: state.pull.clone(),
            }
        }
    }

    fn log_transition(result: Result<(), AggregateError>) {
        if let Err(err) = result {
            warn!(error = %err, "status listener failed");
        }
    }

    #[derive(Default)]
    struct FactoryState {
        channels: Vec<(String, Arc<MockChannel>)>,
        fail_init: HashSet<String>,
    }

    /// Factory handing each remote its own [`MockChannel`].
    #[derive(Default)]
    pub struct MockChannelFactory {
        state: Mutex<FactoryState>,
    }

    impl MockChannelFactory {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Channels created for this remote name refuse to connect.
        pub fn fail_init_for(&self, remote_name: impl Into<String>) {
            self.state
                .lock()
                .unwrap()
                .fail_init
                .insert(remote_name.into());
        }

        /// The most recent channel created for this remote.
        #[must_use]
        pub fn channel(&self, remote_name: &str) -> Option<Arc<MockChannel>> {
            self.state
                .lock()
                .unwrap()
                .channels
                .iter()
                .rev()
                .find(|(name, _)| name == remote_name)
                .map(|(_, channel)| Arc::clone(channel))
        }

        /// Number of channels created so far.
        #[must_use]
        pub fn created(&self) -> usize {
            self.state.lock().unwrap().channels.len()
        }
    }

    impl ChannelFactory for MockChannelFactory {
        fn create(
            &self,
            record: &RemoteRecord,
            cursors: Arc<dyn SyncCursorStorage>,
        ) -> Arc<dyn Channel> {
            let channel = MockChannel::for_remote(record, cursors);
            let mut state = self.state.lock().unwrap();
            if state.fail_init.contains(&record.name) {
                channel.state.lock().unwrap().fail_init = true;
            }
            state.channels.push((record.name.clone(), Arc::clone(&channel)));
            channel
        }
    }
}
