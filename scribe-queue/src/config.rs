//! Manager tuning knobs.

use std::time::Duration;

/// Dispatch and retry configuration for the queue manager.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Jobs executed concurrently, across documents.
    pub max_workers: usize,

    /// Backoff before the first retry; doubles per retry.
    pub retry_base_delay: Duration,

    /// Ceiling for the backoff, jitter included.
    pub retry_max_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}
