//! The mirrored `PipelineRun` view and the derived classes computed from it.
//!
//! The controller never interprets more of the orchestrator's object than
//! what's modeled here; everything else rides along in `raw` so the
//! Enforcement Protocol can deep-copy and re-submit it untouched.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Label the controller uses to claim ownership of a paused run.
pub const MANAGED_LABEL: &str = "queue.tekton.dev/managed";
/// The only value the controller ever writes to [`MANAGED_LABEL`].
pub const MANAGED_LABEL_VALUE: &str = "yes";
/// The `spec.status` sentinel the orchestrator honors by not starting a run.
pub const PAUSED_SENTINEL: &str = "PipelineRunPending";
/// Compiled-in fallback for the global concurrency limit.
pub const DEFAULT_LIMIT: u32 = 10;
/// Default glob for the managed namespace set.
pub const DEFAULT_NAMESPACE_GLOB: &str = "*-cicd";

/// `<namespace>/<name>`, the Store's key and the tie-breaker for FIFO ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A mirrored pipeline-run object: the subset of orchestrator state the
/// core reasons about, plus the full body for deep-copy during Enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub key: ObjectKey,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub resource_version: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// `spec.status`: absent/empty means runnable/running.
    pub spec_status: Option<String>,
    /// `status.conditions[0].status`: `Unknown` | `True` | `False`, absent if no conditions yet.
    pub condition_status: Option<String>,
    /// The full object body, used only for Enforcement's deep-copy-and-strip step.
    pub raw: Value,
}

impl PipelineRun {
    /// First condition status ≠ `Unknown` (and is present) means terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self.condition_status.as_deref(), Some(s) if s != "Unknown")
    }

    pub fn is_paused(&self) -> bool {
        self.spec_status.as_deref() == Some(PAUSED_SENTINEL)
    }

    pub fn is_managed(&self) -> bool {
        self.labels.get(MANAGED_LABEL).map(String::as_str) == Some(MANAGED_LABEL_VALUE)
    }

    /// Not terminal and not paused.
    pub fn is_running(&self) -> bool {
        !self.is_terminal() && !self.is_paused()
    }

    /// Not terminal, paused, and bearing the managed label (I2: unlabeled paused
    /// runs are user-owned templates, not queue members).
    pub fn is_queued(&self) -> bool {
        !self.is_terminal() && self.is_paused() && self.is_managed()
    }
}

/// Orders queued runs for FIFO admission: ascending `creationTimestamp`,
/// ties broken by lexicographic key.
pub fn fifo_order(a: &PipelineRun, b: &PipelineRun) -> Ordering {
    a.creation_timestamp
        .cmp(&b.creation_timestamp)
        .then_with(|| a.key.cmp(&b.key))
}

/// The three derived classes computed from a Store snapshot, restricted to
/// the managed namespace set.
#[derive(Debug, Default)]
pub struct Classification {
    pub running: Vec<PipelineRun>,
    /// Sorted ascending by `creationTimestamp`, ties by key.
    pub queued: Vec<PipelineRun>,
}

impl Classification {
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

/// Classify a snapshot of mirrored objects, filtering out anything outside
/// `in_managed_namespace`.
pub fn classify(
    snapshot: impl IntoIterator<Item = PipelineRun>,
    in_managed_namespace: impl Fn(&str) -> bool,
) -> Classification {
    let mut running = Vec::new();
    let mut queued = Vec::new();
    for run in snapshot {
        if !in_managed_namespace(&run.key.namespace) {
            continue;
        }
        if run.is_terminal() {
            continue;
        }
        if run.is_queued() {
            queued.push(run);
        } else if run.is_running() {
            running.push(run);
        }
        // Paused-but-unmanaged runs are mirrored but excluded from both classes.
    }
    queued.sort_by(fifo_order);
    Classification { running, queued }
}
