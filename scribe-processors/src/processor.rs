//! The processor seam: embedders implement [`Processor`] per concern.

use crate::ProcessorFilter;
use async_trait::async_trait;
use scribe_types::{DocumentHeader, Operation, ProcessorId};
use std::sync::Arc;

/// Consumes committed operations that pass its registration filter.
///
/// A failing processor is logged and skipped for that batch; it never
/// blocks other processors or the pipeline. Processors that need
/// durability or replay own it themselves.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Handles one batch of matched operations, in commit order.
    async fn on_operations(&self, operations: &[Operation]) -> anyhow::Result<()>;

    /// Called once when the processor is detached, on factory
    /// unregistration or drive deletion.
    async fn on_disconnect(&self) -> anyhow::Result<()>;
}

/// A live processor plus the filter that routes operations to it.
#[derive(Clone)]
pub struct ProcessorRecord {
    /// Identifies this instance in logs and lookups.
    pub id: ProcessorId,

    /// The processor itself.
    pub processor: Arc<dyn Processor>,

    /// Which operations it wants.
    pub filter: ProcessorFilter,
}

impl ProcessorRecord {
    /// Pairs a processor with its filter under a fresh id.
    #[must_use]
    pub fn new(processor: Arc<dyn Processor>, filter: ProcessorFilter) -> Self {
        Self {
            id: ProcessorId::new(),
            processor,
            filter,
        }
    }
}

impl std::fmt::Debug for ProcessorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRecord")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Builds the processors one factory contributes to a drive.
///
/// Invoked once per (factory, drive): when a drive is first observed, or
/// for every known drive when the factory is registered late.
#[async_trait]
pub trait ProcessorFactory: Send + Sync {
    /// Creates this factory's processors for one drive.
    async fn create(&self, drive: &DocumentHeader) -> anyhow::Result<Vec<ProcessorRecord>>;
}

pub mod mock {
    //! Scripted processors and factories for tests.

    use super::{Processor, ProcessorFactory, ProcessorRecord};
    use crate::ProcessorFilter;
    use async_trait::async_trait;
    use scribe_types::{DocumentHeader, Operation};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records every operation batch it receives, with a switch to fail
    /// each delivery.
    #[derive(Default)]
    pub struct MockProcessor {
        received: Mutex<Vec<Operation>>,
        batches: AtomicUsize,
        disconnected: AtomicBool,
        fail_with: Option<String>,
    }

    impl MockProcessor {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A processor whose `on_operations` always fails.
        #[must_use]
        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                fail_with: Some(message.into()),
                ..Self::default()
            }
        }

        /// Every operation received so far, in delivery order.
        #[must_use]
        pub fn received(&self) -> Vec<Operation> {
            self.received.lock().unwrap().clone()
        }

        /// Number of `on_operations` calls, including failed ones.
        #[must_use]
        pub fn batch_count(&self) -> usize {
            self.batches.load(Ordering::SeqCst)
        }

        #[must_use]
        pub fn is_disconnected(&self) -> bool {
            self.disconnected.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Processor for MockProcessor {
        async fn on_operations(&self, operations: &[Operation]) -> anyhow::Result<()> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.fail_with {
                anyhow::bail!("{message}");
            }
            self.received.lock().unwrap().extend_from_slice(operations);
            Ok(())
        }

        async fn on_disconnect(&self) -> anyhow::Result<()> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Hands out one shared [`MockProcessor`] from every `create` call and
    /// records the drives it was invoked for.
    pub struct MockFactory {
        filter: ProcessorFilter,
        processor: Arc<MockProcessor>,
        creates: AtomicUsize,
        drives: Mutex<Vec<DocumentHeader>>,
        fail: bool,
    }

    impl MockFactory {
        #[must_use]
        pub fn new(filter: ProcessorFilter) -> Self {
            Self::for_processor(Arc::new(MockProcessor::new()), filter)
        }

        /// A factory handing out the given processor.
        #[must_use]
        pub fn for_processor(processor: Arc<MockProcessor>, filter: ProcessorFilter) -> Self {
            Self {
                filter,
                processor,
                creates: AtomicUsize::new(0),
                drives: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        /// A factory whose `create` always fails.
        #[must_use]
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(ProcessorFilter::any())
            }
        }

        /// The processor this factory hands out.
        #[must_use]
        pub fn processor(&self) -> Arc<MockProcessor> {
            Arc::clone(&self.processor)
        }

        /// Number of `create` calls, including failed ones.
        #[must_use]
        pub fn create_count(&self) -> usize {
            self.creates.load(Ordering::SeqCst)
        }

        /// Headers of every drive this factory was invoked for.
        #[must_use]
        pub fn drives_seen(&self) -> Vec<DocumentHeader> {
            self.drives.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessorFactory for MockFactory {
        async fn create(&self, drive: &DocumentHeader) -> anyhow::Result<Vec<ProcessorRecord>> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.drives.lock().unwrap().push(drive.clone());
            if self.fail {
                anyhow::bail!("factory refused to build processors");
            }
            Ok(vec![ProcessorRecord::new(
                Arc::clone(&self.processor) as Arc<dyn Processor>,
                self.filter.clone(),
            )])
        }
    }
}
