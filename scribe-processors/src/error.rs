//! Error types for factory registration.

use thiserror::Error;

/// Convenience alias for processor registry results.
pub type ProcessorResult<T> = std::result::Result<T, ProcessorError>;

/// Errors from registering and removing processor factories.
///
/// Routing never returns these: factory and processor failures during
/// routing are logged and swallowed so one consumer cannot stall the
/// pipeline.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// A factory is already registered under this identifier.
    #[error("processor factory {0} is already registered")]
    DuplicateFactory(String),

    /// No factory is registered under this identifier.
    #[error("processor factory {0} is not registered")]
    FactoryNotFound(String),
}
