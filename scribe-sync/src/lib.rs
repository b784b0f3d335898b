//! Replication of committed operations between Scribe nodes.
//!
//! A [`SyncManager`] sits on the write path: operations committed locally
//! fan out to the outbox of every registered remote whose filter matches,
//! and transfers pulled from a remote come back in as load jobs through
//! the queue. Each remote owns a [`Channel`], the transport seam, which
//! carries three [`Mailbox`]es: an outbox of transfers awaiting push, an
//! inbox of pulled transfers awaiting execution, and a dead-letter box of
//! terminal failures kept for inspection.
//!
//! Every transfer is a [`SyncOperation`], a forward-only status machine:
//! it never moves backward, skipping ahead is allowed, and `Error`
//! outranks `Applied`. The transport-side [`JobHandle`] has no such
//! guard; it mirrors whatever the channel last reported.
//!
//! Only the in-memory mock channel ships here; production transports
//! implement [`Channel`] and [`ChannelFactory`] against the wire types in
//! [`protocol`].

mod builder;
pub mod channel;
mod error;
mod mailbox;
mod manager;
mod operation;
pub mod protocol;
mod storage;

pub use builder::SyncBuilder;
pub use channel::{
    Channel, ChannelConfig, ChannelFactory, ChannelHealth, HealthState, RemoteStatus,
};
pub use error::{AggregateError, ChannelError, ChannelErrorKind, SyncError, SyncResult};
pub use mailbox::Mailbox;
pub use manager::{Remote, SyncManager};
pub use operation::{JobHandle, SyncOperation, SyncOperationStatus};
pub use protocol::{
    ListenerRegistration, ListenerRevision, OperationUpdate, StrandUpdate, UpdateContext,
    UpdateStatus,
};
pub use storage::{
    MemorySyncStorage, RemoteRecord, SyncCursor, SyncCursorStorage, SyncRemoteStorage,
};
