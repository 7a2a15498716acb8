//! Error taxonomy shared by the store, the client contract and the control loops.
//!
//! This mirrors the narrow set of conditions the rest of the system actually
//! branches on: everything else is an opaque, non-fatal
//! [`Error::Orchestrator`].

use thiserror::Error;

/// Errors surfaced by an [`crate::client::OrchestratorClient`] implementation.
#[derive(Error, Debug)]
pub enum Error {
    /// The watch cursor (`resourceVersion`) is no longer valid; the caller must re-list.
    #[error("resource version expired, re-list required")]
    ResourceVersionExpired,

    /// A `spec.status` transition was rejected by the orchestrator (e.g. the run already
    /// advanced past the point where pausing is legal).
    #[error("state transition rejected by orchestrator")]
    StateTransitionRejected,

    /// The limit custom resource is missing or its `spec.maxPipelines` field is malformed.
    #[error("limit configuration missing or malformed: {0}")]
    Config(String),

    /// Any other orchestrator-side failure (network, auth, server error, ...).
    #[error("orchestrator error: {0}")]
    Orchestrator(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A mirrored object was missing data the Enforcement Protocol assumes is
    /// always present (e.g. `metadata.name`). Should not occur in practice.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an arbitrary error as an opaque orchestrator failure.
    pub fn orchestrator<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Orchestrator(Box::new(err))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
