//! Actions: the raw intent submitted against a document.
//!
//! An action is what callers hand to the queue; the executor runs it through
//! the document's reducer, which turns it into an appended [`Operation`].
//! Action kinds are a closed tag plus a `Custom` arm for reducer-defined
//! mutations, so dispatch is an exhaustive match rather than string
//! comparison scattered through the pipeline.
//!
//! [`Operation`]: crate::Operation

use crate::{ActionId, Error, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document-lifecycle kinds handled by the core itself.
pub const CREATE_DOCUMENT: &str = "CREATE_DOCUMENT";
/// See [`CREATE_DOCUMENT`].
pub const DELETE_DOCUMENT: &str = "DELETE_DOCUMENT";

/// The kind of mutation an action requests.
///
/// `CreateDocument` and `DeleteDocument` are recognized by the core (drive
/// detection, document lifecycle); everything else is a reducer-defined
/// mutation carried verbatim in `Custom`. An empty kind is rejected at
/// construction, before any dispatch happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionKind {
    /// Creates a new document; input carries the initial header/state.
    CreateDocument,
    /// Deletes a document; input carries the target document id.
    DeleteDocument,
    /// A mutation defined by the document model's reducer.
    Custom(String),
}

impl ActionKind {
    /// Parses an action kind from its wire string.
    ///
    /// # Errors
    /// Returns [`Error::InvalidActionKind`] when the string is empty.
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "" => Err(Error::InvalidActionKind("empty action kind".to_string())),
            CREATE_DOCUMENT => Ok(Self::CreateDocument),
            DELETE_DOCUMENT => Ok(Self::DeleteDocument),
            other => Ok(Self::Custom(other.to_string())),
        }
    }

    /// Returns the wire string for this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateDocument => CREATE_DOCUMENT,
            Self::DeleteDocument => DELETE_DOCUMENT,
            Self::Custom(name) => name,
        }
    }

    /// True for kinds the core handles itself rather than the reducer.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::CreateDocument | Self::DeleteDocument)
    }
}

impl TryFrom<String> for ActionKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed mutation request against one document scope.
///
/// Actions are immutable once created; the executor never mutates them, it
/// only derives operations from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for this action.
    pub id: ActionId,

    /// What the action does.
    pub kind: ActionKind,

    /// The scope this action mutates ("global", "local", ...).
    pub scope: String,

    /// Reducer-defined input payload.
    pub input: serde_json::Value,

    /// When the action was created.
    pub timestamp: Timestamp,
}

impl Action {
    /// Creates a new action with a fresh id and the current timestamp.
    #[must_use]
    pub fn new(kind: ActionKind, scope: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: ActionId::new(),
            kind,
            scope: scope.into(),
            input,
            timestamp: Timestamp::now(),
        }
    }

    /// Creates a reducer-defined mutation action.
    ///
    /// # Errors
    /// Returns [`Error::InvalidActionKind`] when `kind` is empty.
    pub fn custom(
        kind: &str,
        scope: impl Into<String>,
        input: serde_json::Value,
    ) -> Result<Self, Error> {
        Ok(Self::new(ActionKind::parse(kind)?, scope, input))
    }
}
