//! The concrete `kube`-backed [`OrchestratorClient`], adapted from the
//! teacher's typed `Api<K>` surface (`kube_client::api::core_methods`) but
//! driven against [`DynamicObject`] because both the limit CRD and
//! pipeline-runs are owned by an external project with no compiled-in types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams, WatchEvent as KubeWatchEvent,
    WatchParams,
};
use kube::core::ErrorResponse;
use kube::Client;
use serde_json::{json, Value};

use queue_core::{Error, EventStream, ListResult, OrchestratorClient, Result};

use crate::config::{
    Config, LIMIT_CRD_GROUP, LIMIT_CRD_KIND, LIMIT_CRD_NAME, LIMIT_CRD_PLURAL, LIMIT_CRD_VERSION, PIPELINE_RUN_GROUP,
    PIPELINE_RUN_KIND, PIPELINE_RUN_PLURAL, PIPELINE_RUN_VERSION,
};
use crate::conversion::pipeline_run_from_dynamic;

const FIELD_MANAGER: &str = "queue-controller";

pub struct KubeOrchestratorClient {
    client: Client,
    pipeline_run_resource: ApiResource,
    limit_resource: ApiResource,
    default_limit: u32,
}

impl KubeOrchestratorClient {
    pub fn new(client: Client, config: &Config) -> Self {
        let pipeline_run_gvk = GroupVersionKind::gvk(PIPELINE_RUN_GROUP, PIPELINE_RUN_VERSION, PIPELINE_RUN_KIND);
        let pipeline_run_resource = ApiResource::from_gvk_with_plural(&pipeline_run_gvk, PIPELINE_RUN_PLURAL);

        let limit_gvk = GroupVersionKind::gvk(LIMIT_CRD_GROUP, LIMIT_CRD_VERSION, LIMIT_CRD_KIND);
        let limit_resource = ApiResource::from_gvk_with_plural(&limit_gvk, LIMIT_CRD_PLURAL);

        Self {
            client,
            pipeline_run_resource,
            limit_resource,
            default_limit: config.default_limit,
        }
    }

    fn all_namespaces_api(&self) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &self.pipeline_run_resource)
    }

    fn namespaced_api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.pipeline_run_resource)
    }

    fn limit_api(&self) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &self.limit_resource)
    }
}

/// Classify a [`kube::Error`] into the narrow taxonomy the control loops branch on.
fn classify_kube_error(err: kube::Error) -> Error {
    match &err {
        kube::Error::Api(resp) => classify_error_response(resp),
        _ => Error::orchestrator(err),
    }
}

/// Same classification for an [`ErrorResponse`] surfaced inline in a watch
/// stream (`WatchEvent::Error`), which carries no wrapping [`kube::Error`].
fn classify_error_response(resp: &ErrorResponse) -> Error {
    match resp.code {
        410 => Error::ResourceVersionExpired,
        409 | 422 => Error::StateTransitionRejected,
        code => Error::orchestrator(OpaqueApiError(format!("{code}: {}", resp.message))),
    }
}

/// A minimal error wrapper for an [`ErrorResponse`] we don't otherwise have a
/// classification for (it isn't [`Clone`], so it can't ride along unwrapped).
#[derive(Debug)]
struct OpaqueApiError(String);

impl std::fmt::Display for OpaqueApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "orchestrator API error: {}", self.0)
    }
}

impl std::error::Error for OpaqueApiError {}

#[async_trait]
impl OrchestratorClient for KubeOrchestratorClient {
    async fn read_limit(&self) -> u32 {
        match self.limit_api().get(LIMIT_CRD_NAME).await {
            Ok(obj) => obj
                .data
                .get("spec")
                .and_then(|s| s.get("maxPipelines"))
                .and_then(Value::as_u64)
                .map(|v| v as u32)
                .unwrap_or_else(|| {
                    tracing::warn!(name = LIMIT_CRD_NAME, "limit object missing spec.maxPipelines, using default");
                    self.default_limit
                }),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read limit object, using default");
                self.default_limit
            }
        }
    }

    async fn list_all(&self) -> Result<ListResult> {
        let lp = kube::api::ListParams::default();
        let listed = self.all_namespaces_api().list(&lp).await.map_err(classify_kube_error)?;
        let resource_version = listed.metadata.resource_version.clone().unwrap_or_default();
        let mut items = Vec::with_capacity(listed.items.len());
        for obj in &listed.items {
            items.push(pipeline_run_from_dynamic(obj)?);
        }
        Ok(ListResult { items, resource_version })
    }

    async fn watch_from(&self, resource_version: &str) -> Result<EventStream> {
        let wp = WatchParams::default();
        let stream = self
            .all_namespaces_api()
            .watch(&wp, resource_version)
            .await
            .map_err(classify_kube_error)?;
        Ok(translate_watch_stream(stream))
    }

    async fn patch_spec_status(&self, namespace: &str, name: &str, value: Option<&str>) -> Result<()> {
        let patch = json!({ "spec": { "status": value } });
        self.namespaced_api(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(classify_kube_error)?;
        Ok(())
    }

    async fn patch_label(&self, namespace: &str, name: &str, key: &str, value: &str) -> Result<()> {
        let patch = json!({ "metadata": { "labels": { key: value } } });
        self.namespaced_api(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(classify_kube_error)?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.namespaced_api(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(classify_kube_error)?;
        Ok(())
    }

    async fn create(&self, namespace: &str, body: Value) -> Result<()> {
        let obj: DynamicObject = serde_json::from_value(body).map_err(Error::orchestrator)?;
        self.namespaced_api(namespace)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(classify_kube_error)?;
        Ok(())
    }
}

fn translate_watch_stream(
    stream: impl Stream<Item = kube::Result<KubeWatchEvent<DynamicObject>>> + Send + 'static,
) -> EventStream {
    let translated = stream.filter_map(|event| async move {
        match event {
            Ok(KubeWatchEvent::Added(obj)) => Some(pipeline_run_from_dynamic(&obj).map(queue_core::WatchEvent::Added)),
            Ok(KubeWatchEvent::Modified(obj)) => Some(pipeline_run_from_dynamic(&obj).map(queue_core::WatchEvent::Modified)),
            Ok(KubeWatchEvent::Deleted(obj)) => Some(pipeline_run_from_dynamic(&obj).map(queue_core::WatchEvent::Deleted)),
            // Bookmarks carry no object of our own shape; they only advance the cursor,
            // which the caller already tracks off the last real event it saw.
            Ok(KubeWatchEvent::Bookmark(_)) => None,
            Ok(KubeWatchEvent::Error(err)) => Some(Err(classify_error_response(&err))),
            Err(err) => Some(Err(classify_kube_error(err))),
        }
    });
    Box::pin(translated) as Pin<Box<_>>
}
