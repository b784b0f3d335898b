//! Assembly of a [`SyncManager`] from its parts.

use crate::channel::ChannelFactory;
use crate::error::{SyncError, SyncResult};
use crate::manager::SyncManager;
use crate::storage::{MemorySyncStorage, SyncCursorStorage, SyncRemoteStorage};
use scribe_bus::EventBus;
use scribe_queue::QueueManager;
use scribe_storage::OperationStorage;
use std::sync::Arc;

/// Builder for a [`SyncManager`].
///
/// The bus, queue, operation storage and channel factory are required;
/// remote and cursor storage default to a shared in-memory store.
#[derive(Default)]
#[must_use]
pub struct SyncBuilder {
    bus: Option<EventBus>,
    queue: Option<QueueManager>,
    operations: Option<Arc<dyn OperationStorage>>,
    remote_storage: Option<Arc<dyn SyncRemoteStorage>>,
    cursor_storage: Option<Arc<dyn SyncCursorStorage>>,
    channel_factory: Option<Arc<dyn ChannelFactory>>,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bus announcing committed writes and job outcomes.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The queue that applies pulled transfers.
    pub fn queue(mut self, queue: QueueManager) -> Self {
        self.queue = Some(queue);
        self
    }

    /// The operation log backfills are read from.
    pub fn operations(mut self, operations: Arc<dyn OperationStorage>) -> Self {
        self.operations = Some(operations);
        self
    }

    /// Where registered remotes are persisted.
    pub fn remote_storage(mut self, storage: Arc<dyn SyncRemoteStorage>) -> Self {
        self.remote_storage = Some(storage);
        self
    }

    /// Where pull cursors are persisted.
    pub fn cursor_storage(mut self, storage: Arc<dyn SyncCursorStorage>) -> Self {
        self.cursor_storage = Some(storage);
        self
    }

    /// Builds channels for registered remotes.
    pub fn channel_factory(mut self, factory: Arc<dyn ChannelFactory>) -> Self {
        self.channel_factory = Some(factory);
        self
    }

    /// Assembles the manager. Call [`SyncManager::startup`] to run it.
    ///
    /// # Errors
    /// Fails when a required part is missing.
    pub fn build(self) -> SyncResult<Arc<SyncManager>> {
        let bus = self
            .bus
            .ok_or_else(|| SyncError::Configuration("an event bus is required".to_string()))?;
        let queue = self
            .queue
            .ok_or_else(|| SyncError::Configuration("a queue manager is required".to_string()))?;
        let operations = self.operations.ok_or_else(|| {
            SyncError::Configuration("an operation storage is required".to_string())
        })?;
        let channel_factory = self.channel_factory.ok_or_else(|| {
            SyncError::Configuration("a channel factory is required".to_string())
        })?;

        let memory = Arc::new(MemorySyncStorage::new());
        let remote_storage: Arc<dyn SyncRemoteStorage> = match self.remote_storage {
            Some(storage) => storage,
            None => Arc::clone(&memory) as Arc<dyn SyncRemoteStorage>,
        };
        let cursor_storage: Arc<dyn SyncCursorStorage> = match self.cursor_storage {
            Some(storage) => storage,
            None => Arc::clone(&memory) as Arc<dyn SyncCursorStorage>,
        };

        Ok(SyncManager::new(
            bus,
            queue,
            operations,
            remote_storage,
            cursor_storage,
            channel_factory,
        ))
    }
}
