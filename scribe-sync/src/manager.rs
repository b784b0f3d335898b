//! Registration and routing hub for sync remotes.
//!
//! The manager listens on the write path: operations committed locally fan
//! out to every matching remote's outbox, one transfer per document
//! stream, and transfers pulled into an inbox come back in as load jobs
//! through the queue. Registered remotes are persisted; a restart restores
//! them and reconnects their channels.

use crate::channel::{Channel, ChannelConfig, ChannelFactory};
use crate::error::{ChannelError, SyncError, SyncResult};
use crate::operation::SyncOperation;
use crate::storage::{RemoteRecord, SyncCursorStorage, SyncRemoteStorage};
use scribe_bus::{EventBus, JobWriteReady, Subscription};
use scribe_processors::{ProcessorFilter, matches_filter};
use scribe_queue::{JobCompleted, JobFailed, QueueManager};
use scribe_storage::{OperationFilter, OperationStorage};
use scribe_types::{AbortHandle, DocumentId, Job, JobId, Operation, RemoteId, collect_all_pages};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

/// A registered remote and its live channel.
#[derive(Clone)]
pub struct Remote {
    /// Stable identifier.
    pub id: RemoteId,

    /// Unique name the remote is addressed by.
    pub name: String,

    /// Which operations this remote receives.
    pub filter: ProcessorFilter,

    /// The transport moving transfers for this remote.
    pub channel: Arc<dyn Channel>,
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

struct PendingLoad {
    remote_name: String,
    sync_op: Arc<SyncOperation>,
}

struct ManagerState {
    remotes: Vec<Remote>,
    /// Inbox loads in flight, keyed by the queue's job id.
    pending: HashMap<JobId, PendingLoad>,
    shutdown: bool,
}

/// Routes committed operations to remote outboxes and applies pulled
/// transfers through the job queue.
pub struct SyncManager {
    bus: EventBus,
    queue: QueueManager,
    operations: Arc<dyn OperationStorage>,
    remote_storage: Arc<dyn SyncRemoteStorage>,
    cursor_storage: Arc<dyn SyncCursorStorage>,
    channel_factory: Arc<dyn ChannelFactory>,
    state: Mutex<ManagerState>,
    subscriptions: Mutex<Vec<Subscription>>,
    /// Serializes add/remove/startup/shutdown, which hop across awaits.
    registry_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager").finish_non_exhaustive()
    }
}

impl SyncManager {
    /// Creates a manager over the given parts. Nothing runs until
    /// [`startup`](Self::startup).
    #[must_use]
    pub fn new(
        bus: EventBus,
        queue: QueueManager,
        operations: Arc<dyn OperationStorage>,
        remote_storage: Arc<dyn SyncRemoteStorage>,
        cursor_storage: Arc<dyn SyncCursorStorage>,
        channel_factory: Arc<dyn ChannelFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            queue,
            operations,
            remote_storage,
            cursor_storage,
            channel_factory,
            state: Mutex::new(ManagerState {
                remotes: Vec::new(),
                pending: HashMap::new(),
                shutdown: false,
            }),
            subscriptions: Mutex::new(Vec::new()),
            registry_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Restores persisted remotes and subscribes to the write path.
    ///
    /// A restored remote whose channel refuses to connect is logged and
    /// skipped; it stays persisted and gets another chance on the next
    /// startup. Calling `startup` on a running manager is a no-op.
    ///
    /// # Errors
    /// Fails once the manager has been shut down, or when remote storage
    /// is unreadable.
    pub async fn startup(self: &Arc<Self>) -> SyncResult<()> {
        let _registry = self.registry_lock.lock().await;
        if self.state.lock().unwrap().shutdown {
            return Err(SyncError::Shutdown);
        }
        if !self.subscriptions.lock().unwrap().is_empty() {
            return Ok(());
        }

        for record in self.remote_storage.list().await? {
            let channel = self
                .channel_factory
                .create(&record, Arc::clone(&self.cursor_storage));
            if let Err(err) = channel.init().await {
                warn!(remote = %record.name, error = %err, "channel init failed; remote skipped");
                continue;
            }
            let remote = Remote {
                id: record.id,
                name: record.name.clone(),
                filter: record.filter.clone(),
                channel,
            };
            self.wire_channel(&remote);
            self.state.lock().unwrap().remotes.push(remote);
            debug!(remote = %record.name, "remote restored");
        }

        self.subscribe_topics();
        let restored = self.state.lock().unwrap().remotes.len();
        info!(remotes = restored, "sync manager started");
        Ok(())
    }

    /// Stops routing, drops in-flight load tracking and closes every
    /// channel. Idempotent; registered remotes stay persisted.
    pub async fn shutdown(&self) {
        let _registry = self.registry_lock.lock().await;
        let remotes = {
            let mut state = self.state.lock().unwrap();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.pending.clear();
            std::mem::take(&mut state.remotes)
        };
        self.subscriptions.lock().unwrap().clear();

        for remote in &remotes {
            remote.channel.shutdown().await;
        }
        info!(remotes = remotes.len(), "sync manager shut down");
    }

    /// Registers a remote: persists it, connects its channel, wires the
    /// mailboxes and backfills the outbox from the operation log.
    ///
    /// A backfill failure is logged, not fatal: the remote still receives
    /// everything committed from then on.
    ///
    /// # Errors
    /// Fails on a duplicate name, after shutdown, when persisting fails or
    /// when the channel refuses to connect.
    pub async fn add(
        self: &Arc<Self>,
        name: impl Into<String>,
        config: ChannelConfig,
        filter: ProcessorFilter,
    ) -> SyncResult<Remote> {
        let name = name.into();
        let _registry = self.registry_lock.lock().await;
        {
            let state = self.state.lock().unwrap();
            if state.shutdown {
                return Err(SyncError::Shutdown);
            }
            if state.remotes.iter().any(|remote| remote.name == name) {
                return Err(SyncError::DuplicateRemote(name));
            }
        }

        let record = RemoteRecord::new(name.clone(), config, filter.clone());
        self.remote_storage.upsert(record.clone()).await?;

        let channel = self
            .channel_factory
            .create(&record, Arc::clone(&self.cursor_storage));
        channel.init().await?;

        let remote = Remote {
            id: record.id,
            name: name.clone(),
            filter,
            channel,
        };
        self.wire_channel(&remote);
        self.state.lock().unwrap().remotes.push(remote.clone());
        info!(remote = %name, "remote added");

        if let Err(err) = self.backfill_outbox(&remote).await {
            warn!(remote = %name, error = %err, "outbox backfill failed");
        }
        Ok(remote)
    }

    /// Unregisters a remote: drops its record and pull cursor, and shuts
    /// the channel down. Transfers still in its mailboxes go with it.
    ///
    /// # Errors
    /// Fails when no remote has this name or a storage delete fails.
    pub async fn remove(&self, name: &str) -> SyncResult<()> {
        let _registry = self.registry_lock.lock().await;
        let remote = {
            let state = self.state.lock().unwrap();
            state
                .remotes
                .iter()
                .find(|remote| remote.name == name)
                .cloned()
                .ok_or_else(|| SyncError::RemoteNotFound(name.to_string()))?
        };

        self.remote_storage.remove(name).await?;
        self.cursor_storage.remove(name).await?;
        self.state
            .lock()
            .unwrap()
            .remotes
            .retain(|remote| remote.name != name);
        remote.channel.shutdown().await;
        info!(remote = %name, "remote removed");
        Ok(())
    }

    /// Registered remotes, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<Remote> {
        self.state.lock().unwrap().remotes.clone()
    }

    /// The remote with this name, when registered.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Remote> {
        self.state
            .lock()
            .unwrap()
            .remotes
            .iter()
            .find(|remote| remote.name == name)
            .cloned()
    }

    /// The remote with this id, when registered.
    #[must_use]
    pub fn get_by_id(&self, id: RemoteId) -> Option<Remote> {
        self.state
            .lock()
            .unwrap()
            .remotes
            .iter()
            .find(|remote| remote.id == id)
            .cloned()
    }

    // ── Write-path routing ───────────────────────────────────────────

    fn subscribe_topics(self: &Arc<Self>) {
        let mut subscriptions = self.subscriptions.lock().unwrap();

        let manager = Arc::clone(self);
        subscriptions.push(self.bus.subscribe(move |event: JobWriteReady| {
            let manager = Arc::clone(&manager);
            async move {
                manager.handle_write_ready(&event);
                Ok(())
            }
        }));

        let manager = Arc::clone(self);
        subscriptions.push(self.bus.subscribe(move |event: JobCompleted| {
            let manager = Arc::clone(&manager);
            async move {
                manager.settle_inbox(event.job.id, None);
                Ok(())
            }
        }));

        let manager = Arc::clone(self);
        subscriptions.push(self.bus.subscribe(move |event: JobFailed| {
            let manager = Arc::clone(&manager);
            async move {
                manager.settle_inbox(event.job.id, Some(event.error.message));
                Ok(())
            }
        }));
    }

    /// Fans freshly committed operations out to every matching outbox.
    ///
    /// Operations are never echoed back to the remote they came from.
    /// Within one remote the event is split into one transfer per document
    /// stream, commit order preserved.
    fn handle_write_ready(&self, event: &JobWriteReady) {
        let remotes = {
            let state = self.state.lock().unwrap();
            if state.shutdown {
                return;
            }
            state.remotes.clone()
        };

        for remote in remotes {
            if event.source_remote.as_deref() == Some(remote.name.as_str()) {
                debug!(
                    remote = %remote.name,
                    job_id = %event.job_id,
                    "not echoing operations to their source remote"
                );
                continue;
            }

            let matching: Vec<&Operation> = event
                .operations
                .iter()
                .filter(|operation| matches_filter(operation, &remote.filter))
                .collect();
            if matching.is_empty() {
                continue;
            }

            for (stream, operations) in batch_by_stream(&matching) {
                let transfer = SyncOperation::new(
                    remote.name.clone(),
                    stream.document_id,
                    vec![stream.scope.clone()],
                    stream.branch,
                    operations,
                );
                debug!(
                    remote = %remote.name,
                    sync_op = %transfer.id,
                    document_id = %stream.document_id,
                    operations = transfer.operations.len(),
                    "transfer queued for push"
                );
                remote.channel.outbox().add(Arc::new(transfer));
            }
        }
    }

    /// Connects a channel's mailboxes to the manager: terminal transfers
    /// leave the outbox; inbox arrivals become load jobs.
    fn wire_channel(self: &Arc<Self>, remote: &Remote) {
        let channel = Arc::downgrade(&remote.channel);
        remote.channel.outbox().on_added(move |batch| {
            for sync_op in batch {
                let channel = Weak::clone(&channel);
                sync_op.on(move |op, _prev, next| {
                    if next.is_terminal() {
                        if let Some(channel) = channel.upgrade() {
                            channel.outbox().remove(op.id);
                        }
                    }
                    Ok(())
                });
            }
        });

        let manager = Arc::downgrade(self);
        let remote_name = remote.name.clone();
        remote.channel.inbox().on_added(move |batch| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            for sync_op in batch {
                let manager = Arc::clone(&manager);
                let remote_name = remote_name.clone();
                let sync_op = Arc::clone(sync_op);
                tokio::spawn(async move {
                    manager.apply_inbox(&remote_name, sync_op).await;
                });
            }
        });
    }

    /// Applies one pulled transfer by queueing a load job; the job's
    /// outcome settles the transfer.
    async fn apply_inbox(&self, remote_name: &str, sync_op: Arc<SyncOperation>) {
        let scope = sync_op
            .scopes
            .first()
            .cloned()
            .unwrap_or_else(|| "global".to_string());
        let job = Job::from_operations(
            sync_op.document_id,
            scope,
            sync_op.branch.clone(),
            sync_op.operations.clone(),
        )
        .with_queue_hint(sync_op.job_dependencies.clone())
        .with_source_remote(remote_name);

        match self.queue.add_job(job).await {
            Ok(job_id) => {
                debug!(
                    remote = %remote_name,
                    sync_op = %sync_op.id,
                    job_id = %job_id,
                    "transfer queued for apply"
                );
                self.state.lock().unwrap().pending.insert(
                    job_id,
                    PendingLoad {
                        remote_name: remote_name.to_string(),
                        sync_op,
                    },
                );
            }
            Err(err) => {
                warn!(
                    remote = %remote_name,
                    sync_op = %sync_op.id,
                    error = %err,
                    "transfer could not be queued"
                );
                if let Err(err) = sync_op.failed(ChannelError::inbox(err.to_string())) {
                    warn!(error = %err, "status listener failed");
                }
                self.settle_mailboxes(remote_name, &sync_op, true);
            }
        }
    }

    /// Settles an inbox transfer against its load job's outcome. Outcomes
    /// for jobs the manager did not queue are ignored.
    fn settle_inbox(&self, job_id: JobId, failure: Option<String>) {
        let entry = self.state.lock().unwrap().pending.remove(&job_id);
        let Some(PendingLoad {
            remote_name,
            sync_op,
        }) = entry
        else {
            return;
        };

        match failure {
            None => {
                debug!(remote = %remote_name, sync_op = %sync_op.id, "transfer applied");
                if let Err(err) = sync_op.executed() {
                    warn!(error = %err, "status listener failed");
                }
                self.settle_mailboxes(&remote_name, &sync_op, false);
            }
            Some(message) => {
                warn!(
                    remote = %remote_name,
                    sync_op = %sync_op.id,
                    error = %message,
                    "transfer failed to apply"
                );
                if let Err(err) = sync_op.failed(ChannelError::inbox(message)) {
                    warn!(error = %err, "status listener failed");
                }
                self.settle_mailboxes(&remote_name, &sync_op, true);
            }
        }
    }

    /// Takes a settled transfer out of its remote's inbox, dead-lettering
    /// it first when it failed.
    fn settle_mailboxes(&self, remote_name: &str, sync_op: &Arc<SyncOperation>, failed: bool) {
        let Some(remote) = self.get_by_name(remote_name) else {
            return;
        };
        if failed {
            remote.channel.dead_letter().add(Arc::clone(sync_op));
        }
        remote.channel.inbox().remove(sync_op.id);
    }

    /// Fills a new remote's outbox with everything already committed that
    /// its filter accepts.
    async fn backfill_outbox(&self, remote: &Remote) -> SyncResult<()> {
        let filter = OperationFilter::new();
        let committed = collect_all_pages(
            |cursor| {
                let operations = Arc::clone(&self.operations);
                let filter = filter.clone();
                async move { operations.find(&filter, cursor).await }
            },
            &AbortHandle::new(),
        )
        .await
        .map_err(|err| SyncError::Storage(err.to_string()))?;

        let matching: Vec<&Operation> = committed
            .iter()
            .filter(|operation| matches_filter(operation, &remote.filter))
            .collect();
        if matching.is_empty() {
            return Ok(());
        }

        let mut transfers = 0usize;
        for (stream, operations) in batch_by_stream(&matching) {
            let transfer = SyncOperation::new(
                remote.name.clone(),
                stream.document_id,
                vec![stream.scope.clone()],
                stream.branch,
                operations,
            );
            remote.channel.outbox().add(Arc::new(transfer));
            transfers += 1;
        }
        info!(remote = %remote.name, transfers, "outbox backfilled");
        Ok(())
    }
}

struct StreamKey {
    document_id: DocumentId,
    scope: String,
    branch: String,
}

/// Groups operations by document stream, first appearance first, keeping
/// order within each stream. Operations without context belong to no
/// stream and are dropped with a log line.
fn batch_by_stream(operations: &[&Operation]) -> Vec<(StreamKey, Vec<Operation>)> {
    let mut batches: Vec<(StreamKey, Vec<Operation>)> = Vec::new();
    for operation in operations {
        let Some(context) = &operation.context else {
            debug!(operation_id = %operation.id, "operation without context not replicated");
            continue;
        };
        let slot = batches.iter_mut().find(|(key, _)| {
            key.document_id == context.document_id
                && key.scope == context.scope
                && key.branch == context.branch
        });
        match slot {
            Some((_, batch)) => batch.push((*operation).clone()),
            None => batches.push((
                StreamKey {
                    document_id: context.document_id,
                    scope: context.scope.clone(),
                    branch: context.branch.clone(),
                },
                vec![(*operation).clone()],
            )),
        }
    }
    batches
}
