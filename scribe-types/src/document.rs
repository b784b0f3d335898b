//! Documents: versioned state plus the operation logs that produced it.

use crate::{DocumentId, Operation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity and version metadata for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    /// Unique identifier.
    pub id: DocumentId,

    /// The document model this document follows.
    pub document_type: String,

    /// Optional human-readable handle.
    #[serde(default)]
    pub slug: Option<String>,

    /// The branch this header describes.
    pub branch: String,

    /// Per-scope revision numbers: the index of the next operation
    /// expected in that scope.
    #[serde(default)]
    pub revision: HashMap<String, u64>,
}

impl DocumentHeader {
    /// Creates a header for a fresh document on the given branch.
    #[must_use]
    pub fn new(id: DocumentId, document_type: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            id,
            document_type: document_type.into(),
            slug: None,
            branch: branch.into(),
            revision: HashMap::new(),
        }
    }

    /// The revision of one scope; zero when the scope has no operations yet.
    #[must_use]
    pub fn revision_of(&self, scope: &str) -> u64 {
        self.revision.get(scope).copied().unwrap_or(0)
    }
}

/// Materialized state, split by scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    /// State shared across all replicas.
    pub global: serde_json::Value,

    /// State private to this replica.
    pub local: serde_json::Value,
}

impl DocumentState {
    /// Returns the state slice for a scope, if it is one of the known scopes.
    #[must_use]
    pub fn scope(&self, scope: &str) -> Option<&serde_json::Value> {
        match scope {
            "global" => Some(&self.global),
            "local" => Some(&self.local),
            _ => None,
        }
    }

    /// Replaces the state slice for a scope. Unknown scopes are ignored.
    pub fn set_scope(&mut self, scope: &str, value: serde_json::Value) {
        match scope {
            "global" => self.global = value,
            "local" => self.local = value,
            _ => {}
        }
    }
}

/// A document: header, materialized state and the per-scope operation logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identity and version metadata.
    pub header: DocumentHeader,

    /// Materialized state per scope.
    pub state: DocumentState,

    /// Committed operations, keyed by scope, oldest first.
    #[serde(default)]
    pub operations: HashMap<String, Vec<Operation>>,
}

impl Document {
    /// Creates an empty document from a header.
    #[must_use]
    pub fn new(header: DocumentHeader) -> Self {
        Self {
            header,
            state: DocumentState::default(),
            operations: HashMap::new(),
        }
    }

    /// The committed operations of one scope, oldest first.
    #[must_use]
    pub fn operations_for_scope(&self, scope: &str) -> &[Operation] {
        self.operations.get(scope).map_or(&[], Vec::as_slice)
    }

    /// The index the next operation in `scope` must carry.
    #[must_use]
    pub fn next_index(&self, scope: &str) -> u64 {
        self.operations_for_scope(scope)
            .last()
            .map_or(0, |op| op.index + 1)
    }

    /// Appends a committed operation to its scope's log and bumps the
    /// header revision for that scope.
    pub fn append_operation(&mut self, scope: impl Into<String>, operation: Operation) {
        let scope = scope.into();
        let next = operation.index + 1;
        self.operations.entry(scope.clone()).or_default().push(operation);
        self.header.revision.insert(scope, next);
    }

    /// The state snapshot stamped onto committed operations: every scope
    /// plus the header, so observers can reconstruct the document without
    /// a storage read.
    #[must_use]
    pub fn resulting_state(&self) -> serde_json::Value {
        serde_json::json!({
            "global": self.state.global,
            "local": self.state.local,
            "header": self.header,
        })
    }
}
