//! Error types for the cache layer.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur in cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A ring buffer was requested with zero capacity.
    #[error("ring buffer capacity must be greater than zero")]
    ZeroCapacity,
}
