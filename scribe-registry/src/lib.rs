//! Document model registry.
//!
//! A document model pairs a document type with the [`Reducer`] that applies
//! actions to documents of that type, plus the metadata the rest of the
//! pipeline needs (drive detection). The registry is the single lookup
//! point: the executor resolves reducers through it, the processor manager
//! asks it which types are drives.

mod error;
pub mod reducer;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use reducer::{Reducer, ReducerError};
pub use registry::{DocumentModelModule, DocumentModelRegistry, DocumentModelSpec};
