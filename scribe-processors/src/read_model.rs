//! The read-model seam consumed by the coordinator.

use async_trait::async_trait;
use scribe_types::Operation;

/// A derived view fed by committed operations.
///
/// Implementations own their storage and their idempotency; the
/// coordinator only guarantees in-order delivery across jobs.
#[async_trait]
pub trait ReadModel: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Folds one job's committed operations into the view.
    async fn index_operations(&self, operations: &[Operation]) -> anyhow::Result<()>;
}
