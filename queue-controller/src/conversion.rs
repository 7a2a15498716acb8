//! Translates between `kube`'s [`DynamicObject`] and the mirrored
//! [`PipelineRun`] view model. Pipeline-runs and the limit CRD have no
//! compiled-in schema (they're owned by an external project), so everything
//! is read out of the dynamic JSON body rather than a typed struct, the
//! same pattern `kube_core::dynamic` demonstrates for not-known-at-compile-time
//! resource kinds.

use kube::api::DynamicObject;
use queue_core::model::ObjectKey;
use queue_core::{Error, PipelineRun, Result};

/// Build a [`PipelineRun`] from a watched/listed [`DynamicObject`].
pub fn pipeline_run_from_dynamic(obj: &DynamicObject) -> Result<PipelineRun> {
    let name = obj
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::Internal("object missing metadata.name".to_string()))?;
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();

    let creation_timestamp = obj.metadata.creation_timestamp.as_ref().map(|t| t.0);
    let resource_version = obj.metadata.resource_version.clone();
    let labels = obj.metadata.labels.clone().unwrap_or_default().into_iter().collect();

    let spec_status = obj
        .data
        .get("spec")
        .and_then(|spec| spec.get("status"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let condition_status = obj
        .data
        .get("status")
        .and_then(|status| status.get("conditions"))
        .and_then(|conditions| conditions.as_array())
        .and_then(|conditions| conditions.first())
        .and_then(|first| first.get("status"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let raw = serde_json::to_value(obj).map_err(Error::orchestrator)?;

    Ok(PipelineRun {
        key: ObjectKey::new(namespace, name),
        creation_timestamp,
        resource_version,
        labels,
        spec_status,
        condition_status,
        raw,
    })
}
