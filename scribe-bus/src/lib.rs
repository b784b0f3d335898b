//! Typed in-process event bus for Scribe.
//!
//! Components talk to each other through typed topics instead of shared
//! references: the executor announces durable writes, the read-model
//! coordinator announces indexed operations, the queue announces job
//! lifecycle. Subscribers hold a [`Subscription`] guard and are delivered
//! to sequentially, in registration order.

mod bus;
mod topics;

pub use bus::{EventBus, Subscription, Topic};
pub use topics::{JobReadReady, JobWriteReady};

/// One or more subscribers failed during an emit.
///
/// Delivery always runs to completion; this error aggregates every failure
/// from one emit.
#[derive(Debug, thiserror::Error)]
#[error("{} subscriber(s) failed on topic '{topic}'", .failures.len())]
pub struct EmitError {
    /// The topic that was being delivered.
    pub topic: &'static str,

    /// Every subscriber failure, in delivery order.
    pub failures: Vec<anyhow::Error>,
}
