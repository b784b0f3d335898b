//! Routes committed operations to drive-scoped processors.

use crate::drive::{created_header, deleted_document_id};
use crate::error::{ProcessorError, ProcessorResult};
use crate::filter::matches_filter;
use crate::processor::{ProcessorFactory, ProcessorRecord};
use crate::read_model::ReadModel;
use async_trait::async_trait;
use scribe_registry::DocumentModelRegistry;
use scribe_types::{DocumentHeader, DocumentId, Operation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One instantiated processor, tagged with the factory and drive that
/// own it.
struct Attachment {
    factory_id: String,
    drive_id: DocumentId,
    record: ProcessorRecord,
}

struct ManagerState {
    // Registration order, preserved so instantiation and routing are
    // deterministic.
    factories: Vec<(String, Arc<dyn ProcessorFactory>)>,
    drives: HashMap<DocumentId, DocumentHeader>,
    attachments: Vec<Attachment>,
}

/// Owns processor factories and the processors they spawned, one set per
/// drive.
///
/// The manager is itself a [`ReadModel`]: registered with the
/// coordinator, it watches the committed stream for drive lifecycle and
/// routes every batch to the processors whose filters match. Factories
/// are invoked lazily, once per (factory, drive) pair, whichever of the
/// drive or the factory shows up first.
pub struct ProcessorManager {
    registry: Arc<DocumentModelRegistry>,
    state: Mutex<ManagerState>,
}

impl ProcessorManager {
    /// Creates a manager with no factories and no observed drives.
    #[must_use]
    pub fn new(registry: Arc<DocumentModelRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(ManagerState {
                factories: Vec::new(),
                drives: HashMap::new(),
                attachments: Vec::new(),
            }),
        }
    }

    /// Registers a factory and instantiates its processors for every
    /// drive already observed.
    ///
    /// # Errors
    /// Returns [`ProcessorError::DuplicateFactory`] when the identifier is
    /// taken; the existing registration is left untouched.
    pub async fn register_factory(
        &self,
        factory_id: impl Into<String>,
        factory: Arc<dyn ProcessorFactory>,
    ) -> ProcessorResult<()> {
        let factory_id = factory_id.into();
        let known_drives: Vec<DocumentHeader> = {
            let mut state = self.state.lock().unwrap();
            if state.factories.iter().any(|(id, _)| *id == factory_id) {
                return Err(ProcessorError::DuplicateFactory(factory_id));
            }
            state.factories.push((factory_id.clone(), Arc::clone(&factory)));
            state.drives.values().cloned().collect()
        };

        info!(
            factory = %factory_id,
            drives = known_drives.len(),
            "processor factory registered"
        );
        for drive in &known_drives {
            self.instantiate(&factory_id, factory.as_ref(), drive).await;
        }
        Ok(())
    }

    /// Removes a factory and disconnects every processor it created.
    ///
    /// # Errors
    /// Returns [`ProcessorError::FactoryNotFound`] when the identifier is
    /// unknown.
    pub async fn unregister_factory(&self, factory_id: &str) -> ProcessorResult<()> {
        let removed: Vec<Attachment> = {
            let mut state = self.state.lock().unwrap();
            let position = state
                .factories
                .iter()
                .position(|(id, _)| id == factory_id)
                .ok_or_else(|| ProcessorError::FactoryNotFound(factory_id.to_string()))?;
            state.factories.remove(position);

            let attachments = std::mem::take(&mut state.attachments);
            let (removed, kept): (Vec<_>, Vec<_>) = attachments
                .into_iter()
                .partition(|attachment| attachment.factory_id == factory_id);
            state.attachments = kept;
            removed
        };

        info!(
            factory = %factory_id,
            processors = removed.len(),
            "processor factory unregistered"
        );
        disconnect_all(removed).await;
        Ok(())
    }

    /// Identifiers of every registered factory, in registration order.
    #[must_use]
    pub fn factory_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.factories.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Processors currently attached to one drive.
    #[must_use]
    pub fn processors_for_drive(&self, drive_id: DocumentId) -> Vec<ProcessorRecord> {
        let state = self.state.lock().unwrap();
        state
            .attachments
            .iter()
            .filter(|attachment| attachment.drive_id == drive_id)
            .map(|attachment| attachment.record.clone())
            .collect()
    }

    /// Registers a drive and runs every factory for it. Re-observing a
    /// known drive is a no-op.
    async fn observe_drive(&self, header: DocumentHeader) {
        let factories: Vec<(String, Arc<dyn ProcessorFactory>)> = {
            let mut state = self.state.lock().unwrap();
            if state.drives.contains_key(&header.id) {
                return;
            }
            state.drives.insert(header.id, header.clone());
            state.factories.clone()
        };

        info!(drive_id = %header.id, document_type = %header.document_type, "drive observed");
        for (factory_id, factory) in factories {
            self.instantiate(&factory_id, factory.as_ref(), &header).await;
        }
    }

    /// Removes a drive and disconnects the processors attached to it.
    /// Unknown ids (regular documents) are ignored.
    async fn forget_drive(&self, drive_id: DocumentId) {
        let removed: Vec<Attachment> = {
            let mut state = self.state.lock().unwrap();
            if state.drives.remove(&drive_id).is_none() {
                return;
            }
            let attachments = std::mem::take(&mut state.attachments);
            let (removed, kept): (Vec<_>, Vec<_>) = attachments
                .into_iter()
                .partition(|attachment| attachment.drive_id == drive_id);
            state.attachments = kept;
            removed
        };

        info!(drive_id = %drive_id, processors = removed.len(), "drive removed");
        disconnect_all(removed).await;
    }

    async fn instantiate(
        &self,
        factory_id: &str,
        factory: &dyn ProcessorFactory,
        drive: &DocumentHeader,
    ) {
        match factory.create(drive).await {
            Ok(records) => {
                debug!(
                    factory = %factory_id,
                    drive_id = %drive.id,
                    processors = records.len(),
                    "processors created"
                );
                let mut state = self.state.lock().unwrap();
                // A concurrent registration may have raced us here; the
                // pair stays instantiated at most once.
                let duplicate = state.attachments.iter().any(|attachment| {
                    attachment.factory_id == factory_id && attachment.drive_id == drive.id
                });
                if duplicate {
                    return;
                }
                state
                    .attachments
                    .extend(records.into_iter().map(|record| Attachment {
                        factory_id: factory_id.to_string(),
                        drive_id: drive.id,
                        record,
                    }));
            }
            Err(err) => {
                warn!(
                    factory = %factory_id,
                    drive_id = %drive.id,
                    error = %err,
                    "processor factory failed"
                );
            }
        }
    }

    /// Delivers `operations` to every attached processor whose filter
    /// matches at least one of them.
    async fn route(&self, operations: &[Operation]) {
        let records: Vec<ProcessorRecord> = {
            let state = self.state.lock().unwrap();
            state
                .attachments
                .iter()
                .map(|attachment| attachment.record.clone())
                .collect()
        };

        for record in records {
            let matched: Vec<Operation> = operations
                .iter()
                .filter(|operation| matches_filter(operation, &record.filter))
                .cloned()
                .collect();
            if matched.is_empty() {
                continue;
            }
            if let Err(err) = record.processor.on_operations(&matched).await {
                warn!(
                    processor = %record.id,
                    operations = matched.len(),
                    error = %err,
                    "processor failed to handle operations"
                );
            }
        }
    }
}

async fn disconnect_all(attachments: Vec<Attachment>) {
    for attachment in attachments {
        if let Err(err) = attachment.record.processor.on_disconnect().await {
            warn!(
                processor = %attachment.record.id,
                error = %err,
                "processor failed to disconnect"
            );
        }
    }
}

#[async_trait]
impl ReadModel for ProcessorManager {
    fn name(&self) -> &str {
        "processor-manager"
    }

    async fn index_operations(&self, operations: &[Operation]) -> anyhow::Result<()> {
        // Drive creations first: processors spawned here must see the
        // creating operation in this same batch.
        for operation in operations {
            if let Some(header) = created_header(operation) {
                if self.registry.is_drive(&header.document_type) {
                    self.observe_drive(header).await;
                }
            }
        }

        self.route(operations).await;

        // Deletions last: the closing batch still reaches the drive's
        // processors before they detach.
        for operation in operations {
            if let Some(document_id) = deleted_document_id(operation) {
                self.forget_drive(document_id).await;
            }
        }

        Ok(())
    }
}
