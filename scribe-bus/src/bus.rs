//! The typed publish/subscribe bus.
//!
//! Each topic is a payload type implementing [`Topic`]; subscribing and
//! emitting are keyed by that type, so a subscriber can never receive a
//! payload it did not ask for.
//!
//! Delivery rules:
//! - subscribers run sequentially, in registration order
//! - an emit delivers to the subscriber set as it was when the emit
//!   started; subscriptions added mid-emit wait for the next emit, and a
//!   subscription dropped mid-emit still receives the current one
//! - a failing subscriber never stops delivery; failures are collected and
//!   surfaced once, after every subscriber has run

use crate::EmitError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// A payload type that can be published on the bus.
///
/// The type itself names the topic; `NAME` is only used in logs and errors.
pub trait Topic: Clone + Send + Sync + 'static {
    /// Human-readable topic name for logs and aggregate errors.
    const NAME: &'static str;
}

type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type Callback<T> = Arc<dyn Fn(T) -> BoxFuture + Send + Sync>;

struct Entry<T> {
    id: u64,
    callback: Callback<T>,
}

// One erased Vec<Entry<T>> per topic type.
struct BusState {
    topics: HashMap<TypeId, Box<dyn Any + Send>>,
}

struct BusInner {
    state: Mutex<BusState>,
    next_id: AtomicU64,
}

impl BusInner {
    fn remove(&self, topic: TypeId, id: u64, drain: fn(&mut dyn Any, u64)) {
        let mut state = self.state.lock().unwrap();
        if let Some(entries) = state.topics.get_mut(&topic) {
            drain(entries.as_mut(), id);
        }
    }
}

/// Typed in-process event bus. Cloning is cheap and shares the subscriber
/// registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    topics: HashMap::new(),
                }),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a subscriber for one topic.
    ///
    /// The returned [`Subscription`] unsubscribes when dropped; hold it for
    /// as long as the callback should receive events.
    pub fn subscribe<T, F, Fut>(&self, callback: F) -> Subscription
    where
        T: Topic,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback<T> = Arc::new(move |payload| Box::pin(callback(payload)));

        let mut state = self.inner.state.lock().unwrap();
        let entries = state
            .topics
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Vec::<Entry<T>>::new()));
        entries
            .downcast_mut::<Vec<Entry<T>>>()
            .expect("entries keyed by TypeId")
            .push(Entry { id, callback });

        debug!(topic = T::NAME, subscriber = id, "subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic: TypeId::of::<T>(),
            id,
            drain: drain_entry::<T>,
        }
    }

    /// Delivers `payload` to every current subscriber of `T`, in
    /// registration order.
    ///
    /// # Errors
    /// Returns an [`EmitError`] carrying every subscriber failure; delivery
    /// itself always runs to completion.
    pub async fn emit<T: Topic>(&self, payload: T) -> Result<(), EmitError> {
        // Snapshot under the lock, run callbacks outside it.
        let snapshot: Vec<Callback<T>> = {
            let state = self.inner.state.lock().unwrap();
            match state.topics.get(&TypeId::of::<T>()) {
                Some(entries) => entries
                    .downcast_ref::<Vec<Entry<T>>>()
                    .expect("entries keyed by TypeId")
                    .iter()
                    .map(|entry| Arc::clone(&entry.callback))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut failures = Vec::new();
        for callback in snapshot {
            if let Err(err) = callback(payload.clone()).await {
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            debug!(topic = T::NAME, failed = failures.len(), "emit collected failures");
            Err(EmitError {
                topic: T::NAME,
                failures,
            })
        }
    }

    /// Number of live subscribers for one topic.
    #[must_use]
    pub fn subscriber_count<T: Topic>(&self) -> usize {
        let state = self.inner.state.lock().unwrap();
        state
            .topics
            .get(&TypeId::of::<T>())
            .and_then(|entries| entries.downcast_ref::<Vec<Entry<T>>>())
            .map_or(0, Vec::len)
    }
}

fn drain_entry<T: Topic>(entries: &mut dyn Any, id: u64) {
    if let Some(entries) = entries.downcast_mut::<Vec<Entry<T>>>() {
        entries.retain(|entry| entry.id != id);
    }
}

/// Guard for one registered subscriber. Dropping it unsubscribes; an emit
/// already in flight still delivers to the dropped subscriber.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: TypeId,
    id: u64,
    drain: fn(&mut dyn Any, u64),
}

impl Subscription {
    /// Unsubscribes explicitly. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.topic, self.id, self.drain);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
