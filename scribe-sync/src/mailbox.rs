//! Ordered, keyed buffers of transfers awaiting channel work.

use crate::operation::SyncOperation;
use scribe_types::SyncOperationId;
use std::sync::{Arc, Mutex};

type BatchListener = Arc<dyn Fn(&[Arc<SyncOperation>]) + Send + Sync>;

#[derive(Default)]
struct MailboxState {
    items: Vec<Arc<SyncOperation>>,
    on_added: Vec<BatchListener>,
    on_removed: Vec<BatchListener>,
}

/// Insertion-ordered set of transfers, keyed by id.
///
/// Adding an id that is already present replaces the entry in place, so a
/// retried transfer keeps its position. Listeners observe batches: one
/// `added` call per `add`/`add_many`, one `removed` call per removal that
/// actually removed something. Listeners registered during a callback take
/// effect from the next batch.
#[derive(Default)]
pub struct Mailbox {
    state: Mutex<MailboxState>,
}

impl Mailbox {
    /// An empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one transfer, replacing any entry with the same id in place.
    pub fn add(&self, operation: Arc<SyncOperation>) {
        self.add_many(vec![operation]);
    }

    /// Adds a batch; listeners hear one call with the whole batch.
    pub fn add_many(&self, operations: Vec<Arc<SyncOperation>>) {
        if operations.is_empty() {
            return;
        }
        let listeners = {
            let mut state = self.state.lock().unwrap();
            for operation in &operations {
                let slot = state.items.iter_mut().find(|item| item.id == operation.id);
                match slot {
                    Some(slot) => *slot = Arc::clone(operation),
                    None => state.items.push(Arc::clone(operation)),
                }
            }
            state.on_added.clone()
        };
        for listener in listeners {
            listener(&operations);
        }
    }

    /// Removes one transfer by id, returning it when present.
    pub fn remove(&self, id: SyncOperationId) -> Option<Arc<SyncOperation>> {
        let removed = self.remove_many(&[id]);
        removed.into_iter().next()
    }

    /// Removes a batch by id, returning what was actually present.
    ///
    /// Listeners hear one call carrying exactly the removed transfers;
    /// nothing fires when every id was absent.
    pub fn remove_many(&self, ids: &[SyncOperationId]) -> Vec<Arc<SyncOperation>> {
        let (removed, listeners) = {
            let mut state = self.state.lock().unwrap();
            let mut removed = Vec::new();
            for id in ids {
                if let Some(index) = state.items.iter().position(|item| item.id == *id) {
                    removed.push(state.items.remove(index));
                }
            }
            (removed, state.on_removed.clone())
        };
        if !removed.is_empty() {
            for listener in &listeners {
                listener(&removed);
            }
        }
        removed
    }

    /// The transfer with this id, when present.
    #[must_use]
    pub fn get(&self, id: SyncOperationId) -> Option<Arc<SyncOperation>> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Snapshot of the buffer, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<Arc<SyncOperation>> {
        self.state.lock().unwrap().items.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().items.is_empty()
    }

    /// Registers a listener for added batches.
    pub fn on_added<F>(&self, listener: F)
    where
        F: Fn(&[Arc<SyncOperation>]) + Send + Sync + 'static,
    {
        self.state.lock().unwrap().on_added.push(Arc::new(listener));
    }

    /// Registers a listener for removed batches.
    pub fn on_removed<F>(&self, listener: F)
    where
        F: Fn(&[Arc<SyncOperation>]) + Send + Sync + 'static,
    {
        self.state.lock().unwrap().on_removed.push(Arc::new(listener));
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").field("len", &self.len()).finish()
    }
}
