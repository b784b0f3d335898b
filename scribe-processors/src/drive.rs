//! Drive lifecycle detection from operation content.
//!
//! Nothing here reads storage: creation is recognized from the state
//! snapshot stamped onto CREATE_DOCUMENT operations, deletion from the
//! DELETE_DOCUMENT input.

use scribe_types::{ActionKind, DocumentHeader, DocumentId, Operation};

/// Reconstructs the created document's header from a CREATE_DOCUMENT
/// operation's stamped resulting state.
///
/// Returns `None` for other kinds and when no parseable header was
/// stamped. Callers decide whether the type makes it a drive.
#[must_use]
pub fn created_header(operation: &Operation) -> Option<DocumentHeader> {
    if operation.kind != ActionKind::CreateDocument {
        return None;
    }
    let state = operation.context.as_ref()?.resulting_state.as_ref()?;
    serde_json::from_value(state.get("header")?.clone()).ok()
}

/// The id a DELETE_DOCUMENT operation removes: named in its input,
/// falling back to the operation's own document.
#[must_use]
pub fn deleted_document_id(operation: &Operation) -> Option<DocumentId> {
    if operation.kind != ActionKind::DeleteDocument {
        return None;
    }
    operation
        .input
        .get("documentId")
        .and_then(|id| id.as_str())
        .and_then(|id| id.parse().ok())
        .or_else(|| operation.document_id())
}
