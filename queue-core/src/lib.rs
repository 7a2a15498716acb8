//! Shared data model, in-memory store, and orchestrator client contract for
//! the pipeline-run queue controller: the mirrored `PipelineRun` view, the
//! Object Store, and the `OrchestratorClient` trait shape.

pub mod client;
pub mod error;
pub mod model;
pub mod namespace;
pub mod store;

pub use client::{EventStream, ListResult, OrchestratorClient, WatchEvent};
pub use error::{Error, Result};
pub use model::{classify, Classification, ObjectKey, PipelineRun};
pub use namespace::NamespaceFilter;
pub use store::ObjectStore;
