//! Feeds committed operations into read models, in commit order, with an
//! explicit pause/flush valve.

use crate::read_model::ReadModel;
use scribe_bus::{EventBus, JobReadReady, JobWriteReady, Subscription};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

struct CoordinatorState {
    paused: bool,
    buffered: VecDeque<JobWriteReady>,
}

/// Drives read-model indexing off the write-ready topic.
///
/// Events are indexed strictly in arrival order; within one event every
/// read model runs in parallel. While paused, events queue in an internal
/// FIFO; `resume` only reopens the intake, buffered events wait for
/// [`flush`](Self::flush). After each event a read-ready announcement is
/// emitted with the same job id and operations.
pub struct ReadModelCoordinator {
    bus: EventBus,
    read_models: Vec<Arc<dyn ReadModel>>,
    state: Mutex<CoordinatorState>,
    // tokio's mutex queues waiters fairly, so cross-event order survives
    // the parallel fan-out inside each event.
    process_lock: tokio::sync::Mutex<()>,
    subscription: Mutex<Option<Subscription>>,
}

impl ReadModelCoordinator {
    /// Creates a coordinator over a fixed set of read models.
    #[must_use]
    pub fn new(bus: EventBus, read_models: Vec<Arc<dyn ReadModel>>) -> Self {
        Self {
            bus,
            read_models,
            state: Mutex::new(CoordinatorState {
                paused: false,
                buffered: VecDeque::new(),
            }),
            process_lock: tokio::sync::Mutex::new(()),
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to the write-ready topic. Calling `start` on a running
    /// coordinator is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.subscription.lock().unwrap();
        if slot.is_some() {
            return;
        }

        let coordinator = Arc::clone(self);
        *slot = Some(self.bus.subscribe(move |event: JobWriteReady| {
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator.ingest(event).await;
                Ok(())
            }
        }));

        info!(read_models = self.read_models.len(), "read-model coordinator started");
    }

    /// Unsubscribes from the write-ready topic. Idempotent; buffered
    /// events are kept for a later [`flush`](Self::flush).
    pub fn stop(&self) {
        if let Some(subscription) = self.subscription.lock().unwrap().take() {
            subscription.unsubscribe();
            info!("read-model coordinator stopped");
        }
    }

    /// Holds incoming events in the buffer until [`flush`](Self::flush).
    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.paused {
            state.paused = true;
            info!("read-model coordinator paused");
        }
    }

    /// Lets new events index again. Buffered events stay until
    /// [`flush`](Self::flush).
    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        if state.paused {
            state.paused = false;
            info!(buffered = state.buffered.len(), "read-model coordinator resumed");
        }
    }

    /// Drains buffered events in arrival order, indexing each. Runs even
    /// while paused.
    pub async fn flush(&self) {
        loop {
            let event = {
                let mut state = self.state.lock().unwrap();
                state.buffered.pop_front()
            };
            let Some(event) = event else { break };
            self.process(event).await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.subscription.lock().unwrap().is_some()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    /// Number of events waiting in the pause buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.state.lock().unwrap().buffered.len()
    }

    async fn ingest(&self, event: JobWriteReady) {
        {
            let mut state = self.state.lock().unwrap();
            if state.paused {
                debug!(
                    job_id = %event.job_id,
                    buffered = state.buffered.len() + 1,
                    "write-ready buffered while paused"
                );
                state.buffered.push_back(event);
                return;
            }
        }
        self.process(event).await;
    }

    async fn process(&self, event: JobWriteReady) {
        let _ordered = self.process_lock.lock().await;

        let mut tasks = Vec::with_capacity(self.read_models.len());
        for read_model in &self.read_models {
            let name = read_model.name().to_string();
            let read_model = Arc::clone(read_model);
            let operations = event.operations.clone();
            let task =
                tokio::spawn(async move { read_model.index_operations(&operations).await });
            tasks.push((name, task));
        }

        for (name, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(read_model = %name, error = %err, "read model failed to index");
                }
                Err(err) => {
                    warn!(read_model = %name, error = %err, "read model indexing task failed");
                }
            }
        }

        debug!(
            job_id = %event.job_id,
            operations = event.operations.len(),
            "operations indexed"
        );

        let ready = JobReadReady {
            job_id: event.job_id,
            operations: event.operations,
        };
        if let Err(err) = self.bus.emit(ready).await {
            debug!(error = %err, "read-ready delivery failed");
        }
    }
}
