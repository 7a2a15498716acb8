//! The shape of the Orchestrator Client: an adapter over whatever
//! persists pipeline-run objects and publishes change events. `queue-core`
//! only defines the contract; `queue-controller` supplies the concrete
//! `kube`-backed implementation, and tests supply an in-memory fake.
//!
//! Expressing this as a trait (rather than a concrete struct) is what lets
//! the Watcher/Manager/Enforcement logic in `queue-controller` be exercised
//! against a scripted fake without a real cluster, the same reason control
//! loops built on `kube_runtime` are generic over `Api<K>`/`Stream` rather
//! than hard-wired to one transport.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::Result;
use crate::model::PipelineRun;

/// A single change notification from [`OrchestratorClient::watch_from`].
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(PipelineRun),
    Modified(PipelineRun),
    Deleted(PipelineRun),
}

impl WatchEvent {
    pub fn object(&self) -> &PipelineRun {
        match self {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o,
        }
    }
}

/// Result of a bulk `list`: the items plus an opaque cursor for watch resumption.
#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<PipelineRun>,
    pub resource_version: String,
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<WatchEvent>> + Send>>;

/// Thin adapter over the orchestrator: list, watch (with resource-version
/// resumption), patch, delete, create, and the current concurrency limit.
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    /// Current global limit, or the compiled-in default on any failure. Never errors.
    async fn read_limit(&self) -> u32;

    /// Bulk fetch of every managed-kind object, with an opaque resume cursor.
    async fn list_all(&self) -> Result<ListResult>;

    /// An indefinite-timeout stream of change events, resuming from `resource_version`.
    ///
    /// Ends by error ([`crate::error::Error::ResourceVersionExpired`] or an opaque
    /// orchestrator error) or remote close (the stream simply ends).
    async fn watch_from(&self, resource_version: &str) -> Result<EventStream>;

    /// Set `spec.status` to `value`, or clear it when `value` is `None`.
    async fn patch_spec_status(&self, namespace: &str, name: &str, value: Option<&str>) -> Result<()>;

    /// Idempotent label set.
    async fn patch_label(&self, namespace: &str, name: &str, key: &str, value: &str) -> Result<()>;

    /// Delete with background propagation.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a new object from a full JSON body.
    async fn create(&self, namespace: &str, body: Value) -> Result<()>;
}
