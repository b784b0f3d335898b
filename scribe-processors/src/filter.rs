//! Filters that select which operations a processor receives.

use scribe_types::Operation;
use serde::{Deserialize, Serialize};

/// Whitelist over an operation's context fields.
///
/// Each list is an OR of accepted values; the set lists combine with AND.
/// An empty list matches everything for that field, so the default filter
/// matches every operation. The `document_id` list additionally accepts
/// the literal `"*"` element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorFilter {
    /// Accepted document model types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_type: Vec<String>,

    /// Accepted scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,

    /// Accepted branches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch: Vec<String>,

    /// Accepted document ids; `"*"` accepts any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_id: Vec<String>,
}

impl ProcessorFilter {
    /// A filter that matches every operation.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts to the given document types.
    #[must_use]
    pub fn document_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_type = types.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts to the given scopes.
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts to the given branches.
    #[must_use]
    pub fn branches<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.branch = branches.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts to the given document ids. `"*"` leaves the field open.
    #[must_use]
    pub fn document_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document_id = ids.into_iter().map(Into::into).collect();
        self
    }

    /// True when every field is empty.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.document_type.is_empty()
            && self.scope.is_empty()
            && self.branch.is_empty()
            && self.document_id.is_empty()
    }
}

/// True when `operation` passes every set field of `filter`.
///
/// Operations carrying no context only match the wildcard filter.
#[must_use]
pub fn matches_filter(operation: &Operation, filter: &ProcessorFilter) -> bool {
    let Some(context) = &operation.context else {
        return filter.is_wildcard();
    };

    if !filter.document_type.is_empty() && !filter.document_type.contains(&context.document_type) {
        return false;
    }
    if !filter.scope.is_empty() && !filter.scope.contains(&context.scope) {
        return false;
    }
    if !filter.branch.is_empty() && !filter.branch.contains(&context.branch) {
        return false;
    }
    if !filter.document_id.is_empty() {
        let document_id = context.document_id.to_string();
        if !filter
            .document_id
            .iter()
            .any(|want| want == "*" || *want == document_id)
        {
            return false;
        }
    }

    true
}
