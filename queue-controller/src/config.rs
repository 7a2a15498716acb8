//! Process configuration. No flags, no subcommands: everything is read once
//! at startup from the environment, falling back to hard-coded defaults
//! when unset.

use std::time::Duration;

use queue_core::model::{DEFAULT_LIMIT, DEFAULT_NAMESPACE_GLOB};
use queue_core::NamespaceFilter;

/// Cluster-scoped coordinate of the limit custom resource.
pub const LIMIT_CRD_GROUP: &str = "tekton.devops";
pub const LIMIT_CRD_VERSION: &str = "v1";
pub const LIMIT_CRD_KIND: &str = "globallimits";
pub const LIMIT_CRD_PLURAL: &str = "globallimits";
pub const LIMIT_CRD_NAME: &str = "tekton-queue-limit";

/// Watched resource coordinate.
pub const PIPELINE_RUN_GROUP: &str = "tekton.dev";
pub const PIPELINE_RUN_VERSION: &str = "v1";
pub const PIPELINE_RUN_KIND: &str = "pipelineruns";
pub const PIPELINE_RUN_PLURAL: &str = "pipelineruns";

#[derive(Debug, Clone)]
pub struct Config {
    pub namespace_filter: NamespaceFilter,
    pub manager_tick: Duration,
    pub default_limit: u32,
}

impl Config {
    /// Read from the environment, falling back to compiled-in defaults on
    /// anything unset or malformed (a malformed override is logged and
    /// ignored, it is not a fatal startup error).
    pub fn from_env() -> Self {
        let glob = std::env::var("QUEUE_NAMESPACE_GLOB").unwrap_or_else(|_| DEFAULT_NAMESPACE_GLOB.to_string());
        let namespace_filter = NamespaceFilter::new(&glob).unwrap_or_else(|err| {
            tracing::warn!(pattern = %glob, error = %err, "invalid QUEUE_NAMESPACE_GLOB, falling back to default");
            NamespaceFilter::default()
        });

        let manager_tick = std::env::var("QUEUE_MANAGER_TICK_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let default_limit = std::env::var("QUEUE_DEFAULT_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_LIMIT);

        Self {
            namespace_filter,
            manager_tick,
            default_limit,
        }
    }
}
