//! Maps document types to the modules that know how to mutate them.

use crate::error::{RegistryError, RegistryResult};
use crate::reducer::Reducer;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Static description of a document model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentModelSpec {
    /// The document type this model handles, e.g. `"notes/todo-list"`.
    pub document_type: String,

    /// Human-readable model name.
    pub name: String,

    /// True when documents of this type are drives. Drive creation is
    /// what triggers processor instantiation.
    pub is_drive: bool,
}

impl DocumentModelSpec {
    #[must_use]
    pub fn new(document_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            name: name.into(),
            is_drive: false,
        }
    }

    /// A spec for a drive document type.
    #[must_use]
    pub fn drive(document_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_drive: true,
            ..Self::new(document_type, name)
        }
    }
}

/// A registered document model: its spec plus the reducer that applies
/// actions to documents of its type.
#[derive(Clone)]
pub struct DocumentModelModule {
    pub spec: DocumentModelSpec,
    pub reducer: Arc<dyn Reducer>,
}

impl DocumentModelModule {
    #[must_use]
    pub fn new(spec: DocumentModelSpec, reducer: Arc<dyn Reducer>) -> Self {
        Self { spec, reducer }
    }

    #[must_use]
    pub fn document_type(&self) -> &str {
        &self.spec.document_type
    }
}

impl fmt::Debug for DocumentModelModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentModelModule")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Shared lookup table from document type to [`DocumentModelModule`].
///
/// All methods take `&self`; the registry is meant to be wrapped in an
/// `Arc` and shared between the executor, the processor manager and the
/// embedder's setup code.
#[derive(Debug, Default)]
pub struct DocumentModelRegistry {
    modules: RwLock<HashMap<String, DocumentModelModule>>,
}

impl DocumentModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module for its document type.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateModule`] when the type already
    /// has a module; the existing registration is left untouched.
    pub fn register(&self, module: DocumentModelModule) -> RegistryResult<()> {
        let mut modules = self.modules.write().unwrap();
        let document_type = module.document_type().to_string();
        if modules.contains_key(&document_type) {
            return Err(RegistryError::DuplicateModule(document_type));
        }

        info!(
            document_type = %document_type,
            is_drive = module.spec.is_drive,
            "document model registered"
        );
        modules.insert(document_type, module);
        Ok(())
    }

    /// Removes the module for a document type.
    ///
    /// # Errors
    /// Returns [`RegistryError::ModuleNotFound`] when the type is unknown.
    pub fn unregister(&self, document_type: &str) -> RegistryResult<()> {
        match self.modules.write().unwrap().remove(document_type) {
            Some(_) => {
                info!(document_type = %document_type, "document model unregistered");
                Ok(())
            }
            None => Err(RegistryError::ModuleNotFound(document_type.to_string())),
        }
    }

    /// Looks up the module for a document type.
    ///
    /// # Errors
    /// Returns [`RegistryError::ModuleNotFound`] when the type is unknown.
    pub fn module(&self, document_type: &str) -> RegistryResult<DocumentModelModule> {
        self.modules
            .read()
            .unwrap()
            .get(document_type)
            .cloned()
            .ok_or_else(|| RegistryError::ModuleNotFound(document_type.to_string()))
    }

    /// Looks up just the reducer for a document type.
    ///
    /// # Errors
    /// Returns [`RegistryError::ModuleNotFound`] when the type is unknown.
    pub fn reducer(&self, document_type: &str) -> RegistryResult<Arc<dyn Reducer>> {
        self.module(document_type).map(|m| m.reducer)
    }

    /// True when the type is registered and its spec marks it a drive.
    /// Unknown types are not drives.
    #[must_use]
    pub fn is_drive(&self, document_type: &str) -> bool {
        self.modules
            .read()
            .unwrap()
            .get(document_type)
            .is_some_and(|m| m.spec.is_drive)
    }

    #[must_use]
    pub fn contains(&self, document_type: &str) -> bool {
        self.modules.read().unwrap().contains_key(document_type)
    }

    /// All registered document types, sorted.
    #[must_use]
    pub fn document_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.modules.read().unwrap().keys().cloned().collect();
        types.sort();
        types
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules.read().unwrap().len()
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.modules.write().unwrap().clear();
    }
}
