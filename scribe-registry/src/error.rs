//! Error types for the registry.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A module for this document type is already registered.
    #[error("document model already registered for type: {0}")]
    DuplicateModule(String),

    /// No module registered for this document type.
    #[error("document model not found for type: {0}")]
    ModuleNotFound(String),
}
