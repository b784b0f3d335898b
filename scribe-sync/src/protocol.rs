//! Wire shapes for strand replication.
//!
//! A strand is the slice of one document stream (document, scope, branch)
//! carried in one transfer. The shapes here are transport-neutral; a
//! channel serializes them however its wire wants and converts between
//! them and [`SyncOperation`]s at the mailbox boundary.

use crate::error::SyncResult;
use crate::operation::SyncOperation;
use scribe_processors::ProcessorFilter;
use scribe_types::{
    ActionKind, DocumentId, Operation, OperationContext, OperationId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One stream's slice of operations, as pushed to or pulled from a remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrandUpdate {
    /// The drive the document belongs to, when the remote groups by drive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<DocumentId>,

    /// The document the operations belong to.
    pub document_id: DocumentId,

    /// The scope within the document.
    pub scope: String,

    /// The branch the operations apply on.
    pub branch: String,

    /// The operations, in log order.
    pub operations: Vec<OperationUpdate>,
}

/// One operation on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationUpdate {
    /// Position in the stream's log.
    pub index: u64,

    /// Prior indices intentionally bypassed.
    pub skip: u64,

    /// The action kind that produced the operation.
    pub kind: ActionKind,

    /// Stable operation id.
    pub id: OperationId,

    /// The action input, JSON-encoded.
    pub input: String,

    /// Integrity hash of the resulting state.
    pub hash: String,

    /// When the operation was committed.
    pub timestamp: Timestamp,

    /// Error recorded against the operation, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Signer context, when the operation was signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<UpdateContext>,
}

/// The part of an operation's context that crosses the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateContext {
    /// The signer, as the originating node recorded it.
    pub signer: serde_json::Value,
}

/// Outcome a remote reports for one pushed strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    /// The strand applied cleanly.
    Success,

    /// The remote does not know the document.
    Missing,

    /// The strand contradicts the remote's log.
    Conflict,

    /// The remote failed internally.
    Error,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Success => "SUCCESS",
            Self::Missing => "MISSING",
            Self::Conflict => "CONFLICT",
            Self::Error => "ERROR",
        };
        write!(f, "{status}")
    }
}

/// Acknowledgement for one pushed strand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRevision {
    /// The drive the document belongs to, when the remote groups by drive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<DocumentId>,

    /// The document the acknowledgement is for.
    pub document_id: DocumentId,

    /// The scope within the document.
    pub scope: String,

    /// The branch the operations applied on.
    pub branch: String,

    /// How the remote handled the strand.
    pub status: UpdateStatus,

    /// The stream revision after the strand applied: one past the last
    /// acknowledged operation index.
    pub revision: u64,

    /// The remote's failure description for non-success statuses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A pull listener, as registered with a remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerRegistration {
    /// Identifier the remote files the listener under.
    pub listener_id: String,

    /// Which operations the listener wants.
    pub filter: ProcessorFilter,
}

// ── Conversions ──────────────────────────────────────────────────────

/// Encodes committed operations as one strand.
#[must_use]
pub fn strand_from_operations(
    document_id: DocumentId,
    scope: &str,
    branch: &str,
    operations: &[Operation],
) -> StrandUpdate {
    StrandUpdate {
        drive_id: None,
        document_id,
        scope: scope.to_string(),
        branch: branch.to_string(),
        operations: operations.iter().map(operation_update).collect(),
    }
}

fn operation_update(operation: &Operation) -> OperationUpdate {
    OperationUpdate {
        index: operation.index,
        skip: operation.skip,
        kind: operation.kind.clone(),
        id: operation.id,
        input: operation.input.to_string(),
        hash: operation.hash.clone(),
        timestamp: operation.timestamp,
        error: operation.error.clone(),
        context: operation
            .context
            .as_ref()
            .and_then(|context| context.signer.clone())
            .map(|signer| UpdateContext { signer }),
    }
}

/// Decodes a pulled strand into a transfer ready for an inbox.
///
/// The rebuilt operations carry no resulting state and an empty document
/// type; the executor stamps a fresh context when the load commits. A
/// signer that crossed the wire is kept so the stamp preserves it.
///
/// # Errors
/// Fails when an operation's input is not valid JSON.
pub fn sync_operation_from_strand(
    strand: &StrandUpdate,
    remote_name: &str,
) -> SyncResult<SyncOperation> {
    let mut operations = Vec::with_capacity(strand.operations.len());
    for update in &strand.operations {
        operations.push(operation_from_update(strand, update)?);
    }
    Ok(SyncOperation::new(
        remote_name,
        strand.document_id,
        vec![strand.scope.clone()],
        strand.branch.clone(),
        operations,
    ))
}

fn operation_from_update(strand: &StrandUpdate, update: &OperationUpdate) -> SyncResult<Operation> {
    let input: serde_json::Value = serde_json::from_str(&update.input)?;
    let context = update.context.as_ref().map(|wire| OperationContext {
        document_id: strand.document_id,
        document_type: String::new(),
        scope: strand.scope.clone(),
        branch: strand.branch.clone(),
        signer: Some(wire.signer.clone()),
        resulting_state: None,
    });
    Ok(Operation {
        id: update.id,
        index: update.index,
        skip: update.skip,
        kind: update.kind.clone(),
        input,
        hash: update.hash.clone(),
        timestamp: update.timestamp,
        error: update.error.clone(),
        context,
    })
}
