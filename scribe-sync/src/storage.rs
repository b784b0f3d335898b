//! Persistence contracts for sync bookkeeping: registered remotes and
//! per-remote pull cursors.

use crate::channel::{ChannelConfig, RemoteStatus};
use crate::error::SyncResult;
use async_trait::async_trait;
use scribe_processors::ProcessorFilter;
use scribe_types::{RemoteId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// How far a remote's pull has progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// The remote this cursor tracks.
    pub remote_name: String,

    /// Highest remote ordinal already delivered.
    pub ordinal: u64,

    /// When the cursor last advanced.
    pub last_synced_at: Option<Timestamp>,
}

impl SyncCursor {
    /// The cursor of a remote that has never pulled.
    #[must_use]
    pub fn start(remote_name: impl Into<String>) -> Self {
        Self {
            remote_name: remote_name.into(),
            ordinal: 0,
            last_synced_at: None,
        }
    }
}

/// Stores pull cursors, one per remote.
#[async_trait]
pub trait SyncCursorStorage: Send + Sync {
    /// The cursor for a remote; a remote never seen gets
    /// [`SyncCursor::start`].
    async fn get(&self, remote_name: &str) -> SyncResult<SyncCursor>;

    /// Saves or replaces a cursor, keyed by remote name.
    async fn upsert(&self, cursor: SyncCursor) -> SyncResult<()>;

    /// Drops a cursor. Removing an absent cursor is not an error.
    async fn remove(&self, remote_name: &str) -> SyncResult<()>;
}

/// A registered remote, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Stable identifier, assigned at registration.
    pub id: RemoteId,

    /// Unique name the remote is addressed by.
    pub name: String,

    /// Channel tuning.
    pub config: ChannelConfig,

    /// Which operations this remote receives.
    pub filter: ProcessorFilter,

    /// Channel health at last save.
    #[serde(default)]
    pub status: RemoteStatus,
}

impl RemoteRecord {
    /// A fresh record with a new id and idle health.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ChannelConfig, filter: ProcessorFilter) -> Self {
        Self {
            id: RemoteId::new(),
            name: name.into(),
            config,
            filter,
            status: RemoteStatus::default(),
        }
    }
}

/// Stores registered remotes.
#[async_trait]
pub trait SyncRemoteStorage: Send + Sync {
    /// Every saved remote, sorted by name.
    async fn list(&self) -> SyncResult<Vec<RemoteRecord>>;

    /// Saves or replaces a record, keyed by name.
    async fn upsert(&self, record: RemoteRecord) -> SyncResult<()>;

    /// Drops a record by name. Removing an absent record is not an error.
    async fn remove(&self, remote_name: &str) -> SyncResult<()>;
}

/// Map-backed [`SyncRemoteStorage`] and [`SyncCursorStorage`].
#[derive(Debug, Default)]
pub struct MemorySyncStorage {
    remotes: RwLock<HashMap<String, RemoteRecord>>,
    cursors: RwLock<HashMap<String, SyncCursor>>,
}

impl MemorySyncStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncRemoteStorage for MemorySyncStorage {
    async fn list(&self) -> SyncResult<Vec<RemoteRecord>> {
        let mut records: Vec<RemoteRecord> =
            self.remotes.read().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn upsert(&self, record: RemoteRecord) -> SyncResult<()> {
        self.remotes
            .write()
            .unwrap()
            .insert(record.name.clone(), record);
        Ok(())
    }

    async fn remove(&self, remote_name: &str) -> SyncResult<()> {
        self.remotes.write().unwrap().remove(remote_name);
        Ok(())
    }
}

#[async_trait]
impl SyncCursorStorage for MemorySyncStorage {
    async fn get(&self, remote_name: &str) -> SyncResult<SyncCursor> {
        Ok(self
            .cursors
            .read()
            .unwrap()
            .get(remote_name)
            .cloned()
            .unwrap_or_else(|| SyncCursor::start(remote_name)))
    }

    async fn upsert(&self, cursor: SyncCursor) -> SyncResult<()> {
        self.cursors
            .write()
            .unwrap()
            .insert(cursor.remote_name.clone(), cursor);
        Ok(())
    }

    async fn remove(&self, remote_name: &str) -> SyncResult<()> {
        self.cursors.write().unwrap().remove(remote_name);
        Ok(())
    }
}
