//! The reducer seam: embedders implement [`Reducer`] per document type.

use scribe_types::{Action, Document};
use thiserror::Error;

/// Error raised by a reducer while applying an action.
///
/// Reducer failures are recorded on the job result; they never tear down
/// the executor.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ReducerError {
    pub message: String,
}

impl ReducerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Applies actions to documents for one document type.
///
/// A successful apply must return a document whose operation log for
/// `action.scope` grew by at least one trailing operation. The reducer
/// assigns that operation's index (`document.next_index(scope)`) and hash;
/// provenance context is attached later, when the operation is committed.
pub trait Reducer: Send + Sync {
    /// Applies one action, returning the updated document.
    fn apply(&self, document: &Document, action: &Action) -> Result<Document, ReducerError>;
}

pub mod mock {
    //! A scripted reducer for tests.

    use super::{Reducer, ReducerError};
    use scribe_types::{Action, ActionId, Document, Operation, OperationId, Timestamp};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::sync::Mutex;

    /// Records applied actions and appends one operation per action, with
    /// switches to fail or to return the document unchanged.
    #[derive(Debug, Default)]
    pub struct MockReducer {
        fail_with: Option<String>,
        stall: bool,
        applied: Mutex<Vec<ActionId>>,
    }

    impl MockReducer {
        /// A reducer that sets the scope state to the action input and
        /// appends one operation at the next free index.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A reducer that fails every apply with the given message.
        #[must_use]
        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                fail_with: Some(message.into()),
                ..Self::default()
            }
        }

        /// A reducer that succeeds without appending any operation,
        /// violating the growth contract.
        #[must_use]
        pub fn stalled() -> Self {
            Self {
                stall: true,
                ..Self::default()
            }
        }

        /// Ids of the actions this reducer has been asked to apply.
        #[must_use]
        pub fn applied_actions(&self) -> Vec<ActionId> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl Reducer for MockReducer {
        fn apply(&self, document: &Document, action: &Action) -> Result<Document, ReducerError> {
            self.applied.lock().unwrap().push(action.id);

            if let Some(message) = &self.fail_with {
                return Err(ReducerError::new(message.clone()));
            }

            let mut next = document.clone();
            if self.stall {
                return Ok(next);
            }

            next.state.set_scope(&action.scope, action.input.clone());
            let operation = Operation {
                id: OperationId::new(),
                index: next.next_index(&action.scope),
                skip: 0,
                kind: action.kind.clone(),
                input: action.input.clone(),
                hash: state_hash(&action.input),
                timestamp: Timestamp::now(),
                error: None,
                context: None,
            };
            next.append_operation(action.scope.as_str(), operation);
            Ok(next)
        }
    }

    fn state_hash(value: &serde_json::Value) -> String {
        let mut hasher = DefaultHasher::new();
        value.to_string().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}
