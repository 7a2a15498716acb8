//! The Enforcement Protocol: demote an already-admitted,
//! over-limit run back to paused, escalating from an in-place patch to a
//! destructive delete-and-recreate when the patch is rejected.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use queue_core::model::{MANAGED_LABEL, MANAGED_LABEL_VALUE, PAUSED_SENTINEL};
use queue_core::{Error, OrchestratorClient, PipelineRun, Result};

/// Fields stripped from the deep-copied original before re-creation: they're
/// server-assigned and would either collide or be rejected on `create`.
const STRIPPED_METADATA_FIELDS: &[&str] = &[
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "ownerReferences",
    "generation",
];

/// Run the two-stage escalation against `obj`, which the caller has already
/// determined is admitted (Running) and over the limit.
pub async fn enforce(client: &Arc<dyn OrchestratorClient>, obj: &PipelineRun) {
    match client
        .patch_spec_status(&obj.key.namespace, &obj.key.name, Some(PAUSED_SENTINEL))
        .await
    {
        Ok(()) => {
            tracing::info!(key = %obj.key, "enforcement: paused in place (stage 1)");
            return;
        }
        Err(Error::StateTransitionRejected) => {
            tracing::info!(key = %obj.key, "enforcement: pause rejected, escalating to recreate (stage 2)");
        }
        Err(err) => {
            tracing::warn!(key = %obj.key, error = %err, "enforcement: stage 1 aborted, next observation will retry");
            return;
        }
    }

    if let Err(err) = client.delete(&obj.key.namespace, &obj.key.name).await {
        tracing::warn!(key = %obj.key, error = %err, "enforcement: stage 2 delete failed, aborting attempt");
        return;
    }

    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let new_body = match build_recreated_object(&obj.raw, unix_seconds) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!(key = %obj.key, error = %err, "enforcement: could not build recreated object; run is now lost");
            return;
        }
    };

    match client.create(&obj.key.namespace, new_body).await {
        Ok(()) => tracing::info!(key = %obj.key, "enforcement: recreated paused in queue (stage 2)"),
        Err(err) => {
            tracing::error!(key = %obj.key, error = %err, "enforcement: create failed after delete; run is now lost")
        }
    }
}

/// Deep-copy `original` with server-assigned metadata stripped, the `status`
/// subtree removed, `spec.status` set to the paused sentinel, the managed
/// label applied, and the name rewritten to `<orig[:40]>-q<unix_seconds>`.
///
/// Pure and deterministic given `unix_seconds`, so it's unit-testable without
/// a clock or a cluster.
pub fn build_recreated_object(original: &Value, unix_seconds: u64) -> Result<Value> {
    let mut obj = original.clone();

    let orig_name = obj
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Internal("recreated object source missing metadata.name".to_string()))?
        .to_string();

    let metadata = obj
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::Internal("recreated object source missing metadata object".to_string()))?;

    for field in STRIPPED_METADATA_FIELDS {
        metadata.remove(*field);
    }

    match metadata.get_mut("labels") {
        Some(Value::Object(labels)) => {
            labels.insert(MANAGED_LABEL.to_string(), Value::String(MANAGED_LABEL_VALUE.to_string()));
        }
        _ => {
            metadata.insert(
                "labels".to_string(),
                serde_json::json!({ MANAGED_LABEL: MANAGED_LABEL_VALUE }),
            );
        }
    }

    let truncated: String = orig_name.chars().take(40).collect();
    let new_name = format!("{truncated}-q{unix_seconds}");
    debug_assert!(new_name.len() <= 63, "recreated name must respect the 63-char cap");
    metadata.insert("name".to_string(), Value::String(new_name));

    let top = obj
        .as_object_mut()
        .ok_or_else(|| Error::Internal("recreated object source is not a JSON object".to_string()))?;
    top.remove("status");

    match top.get_mut("spec") {
        Some(Value::Object(spec)) => {
            spec.insert("status".to_string(), Value::String(PAUSED_SENTINEL.to_string()));
        }
        _ => {
            top.insert("spec".to_string(), serde_json::json!({ "status": PAUSED_SENTINEL }));
        }
    }

    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recreated_object_strips_server_assigned_fields_and_preserves_rest() {
        let original = json!({
            "apiVersion": "tekton.dev/v1",
            "kind": "PipelineRun",
            "metadata": {
                "name": "nightly-build-run",
                "namespace": "team-cicd",
                "resourceVersion": "123",
                "uid": "abc-def",
                "creationTimestamp": "2026-01-01T00:00:00Z",
                "ownerReferences": [{"kind": "PipelineRun", "name": "owner"}],
                "generation": 3,
                "labels": {"team": "platform"},
            },
            "spec": { "pipelineRef": { "name": "build" }, "params": [] },
            "status": { "conditions": [{"status": "Unknown"}] },
        });

        let recreated = build_recreated_object(&original, 1_700_000_000).unwrap();

        assert_eq!(recreated["metadata"]["name"], json!("nightly-build-run-q1700000000"));
        assert!(recreated["metadata"].get("resourceVersion").is_none());
        assert!(recreated["metadata"].get("uid").is_none());
        assert!(recreated["metadata"].get("creationTimestamp").is_none());
        assert!(recreated["metadata"].get("ownerReferences").is_none());
        assert!(recreated["metadata"].get("generation").is_none());
        assert!(recreated.get("status").is_none());
        assert_eq!(recreated["spec"]["status"], json!(PAUSED_SENTINEL));
        assert_eq!(recreated["spec"]["pipelineRef"]["name"], json!("build"));
        assert_eq!(recreated["metadata"]["labels"][MANAGED_LABEL], json!(MANAGED_LABEL_VALUE));
        assert_eq!(recreated["metadata"]["labels"]["team"], json!("platform"));
    }

    #[test]
    fn long_name_is_truncated_to_40_chars_before_the_suffix() {
        let long_name = "a".repeat(80);
        let original = json!({
            "metadata": { "name": long_name, "namespace": "team-cicd" },
            "spec": {},
        });
        let recreated = build_recreated_object(&original, 42).unwrap();
        let new_name = recreated["metadata"]["name"].as_str().unwrap();
        assert!(new_name.len() <= 63);
        assert!(new_name.starts_with(&"a".repeat(40)));
        assert!(new_name.ends_with("-q42"));
    }

    #[test]
    fn missing_labels_object_is_created() {
        let original = json!({
            "metadata": { "name": "r1", "namespace": "team-cicd" },
            "spec": {},
        });
        let recreated = build_recreated_object(&original, 1).unwrap();
        assert_eq!(recreated["metadata"]["labels"][MANAGED_LABEL], json!(MANAGED_LABEL_VALUE));
    }

    #[test]
    fn missing_name_is_an_error() {
        let original = json!({ "metadata": {}, "spec": {} });
        assert!(build_recreated_object(&original, 1).is_err());
    }
}
