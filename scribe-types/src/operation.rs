//! Operations: the committed, append-only history of a document.

use crate::{ActionKind, DocumentId, OperationId, Timestamp};
use serde::{Deserialize, Serialize};

/// Provenance attached to an operation when it is appended.
///
/// The signer payload is carried opaquely; the core never verifies
/// signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    /// The document the operation belongs to.
    pub document_id: DocumentId,

    /// The document's model type at append time.
    pub document_type: String,

    /// The scope the operation mutated.
    pub scope: String,

    /// The branch the operation was appended on.
    pub branch: String,

    /// Opaque signer information, when the action was signed.
    #[serde(default)]
    pub signer: Option<serde_json::Value>,

    /// Snapshot of the scope state after this operation applied.
    /// Present on lifecycle operations so observers can reconstruct
    /// headers without a storage read.
    #[serde(default)]
    pub resulting_state: Option<serde_json::Value>,
}

/// One committed entry in a document's operation log.
///
/// Indices are strictly increasing per (document, scope, branch); `skip`
/// records how many prior indices were intentionally bypassed when this
/// operation was appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier for this operation.
    pub id: OperationId,

    /// Position in the scope's log.
    pub index: u64,

    /// Number of prior indices intentionally bypassed.
    pub skip: u64,

    /// The action kind that produced this operation.
    pub kind: ActionKind,

    /// The action input that produced this operation.
    pub input: serde_json::Value,

    /// Integrity hash of the resulting state, carried opaquely.
    pub hash: String,

    /// When the operation was committed.
    pub timestamp: Timestamp,

    /// Reducer error captured with the operation, if any.
    #[serde(default)]
    pub error: Option<String>,

    /// Where and on what the operation was committed.
    #[serde(default)]
    pub context: Option<OperationContext>,
}

impl Operation {
    /// The document this operation belongs to, when context is attached.
    #[must_use]
    pub fn document_id(&self) -> Option<DocumentId> {
        self.context.as_ref().map(|c| c.document_id)
    }

    /// The scope this operation mutated, when context is attached.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.scope.as_str())
    }

    /// The branch this operation was appended on, when context is attached.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.branch.as_str())
    }
}
