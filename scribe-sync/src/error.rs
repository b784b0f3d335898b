//! Error types for the sync layer.

use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the sync manager, its storage and its channels.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote with this name is already registered.
    #[error("remote '{0}' is already registered")]
    DuplicateRemote(String),

    /// No remote with this name is registered.
    #[error("remote '{0}' is not registered")]
    RemoteNotFound(String),

    /// The manager has been shut down and accepts nothing.
    #[error("sync manager is shut down")]
    Shutdown,

    /// Transport-level failure talking to a remote.
    #[error("network error: {0}")]
    Network(String),

    /// Persisting or loading sync bookkeeping failed.
    #[error("sync storage error: {0}")]
    Storage(String),

    /// A wire payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The builder was asked to assemble a manager without a required part.
    #[error("sync configuration error: {0}")]
    Configuration(String),

    /// A channel recorded a failure against a transfer.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Which part of a channel produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelErrorKind {
    /// Applying pulled operations locally.
    Inbox,

    /// Pushing local operations to the remote.
    Outbox,

    /// The channel itself: connect, poll, listener registration.
    Channel,
}

impl fmt::Display for ChannelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Inbox => "inbox",
            Self::Outbox => "outbox",
            Self::Channel => "channel",
        };
        write!(f, "{kind}")
    }
}

/// A failure recorded against one transfer.
///
/// Cheap to clone; a transfer keeps the first failure it saw and hands
/// copies to status listeners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct ChannelError {
    /// Which side of the channel failed.
    pub kind: ChannelErrorKind,

    /// What went wrong.
    pub message: String,
}

impl ChannelError {
    /// A failure applying pulled operations.
    #[must_use]
    pub fn inbox(message: impl Into<String>) -> Self {
        Self {
            kind: ChannelErrorKind::Inbox,
            message: message.into(),
        }
    }

    /// A failure pushing local operations.
    #[must_use]
    pub fn outbox(message: impl Into<String>) -> Self {
        Self {
            kind: ChannelErrorKind::Outbox,
            message: message.into(),
        }
    }

    /// A failure in the channel itself.
    #[must_use]
    pub fn channel(message: impl Into<String>) -> Self {
        Self {
            kind: ChannelErrorKind::Channel,
            message: message.into(),
        }
    }
}

/// Failures collected from status listeners during one transition.
///
/// Every listener runs even when an earlier one fails; the transition
/// itself has already been applied by the time this surfaces.
#[derive(Debug, Error)]
#[error("{} status listener(s) failed", .errors.len())]
pub struct AggregateError {
    /// One entry per failed listener, in registration order.
    pub errors: Vec<anyhow::Error>,
}
