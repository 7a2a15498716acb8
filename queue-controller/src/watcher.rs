//! The Watcher Loop: list+watch the Object Store into existence, resync on
//! resource-version expiry, and run the Enforcement Gate on every
//! `Added`/`Modified` event.
//!
//! The state machine is hand-rolled against [`OrchestratorClient`] rather
//! than built on a generic `watcher()` combinator, because the Enforcement
//! Gate needs to run synchronously against the *same* event the Store just
//! absorbed, without an extra orchestrator round trip. It mirrors the
//! trampolined state machine in `kube_runtime::watcher`, but collapsed to
//! the two states actually distinguished here (`disconnected`/`streaming`;
//! "synced" is a transient step inside `disconnected`).

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use queue_core::model::classify;
use queue_core::{Error, NamespaceFilter, ObjectStore, OrchestratorClient, PipelineRun, WatchEvent};

use crate::enforcement;

const STREAM_ERROR_BACKOFF: Duration = Duration::from_millis(1500);

enum State {
    Disconnected,
    Streaming {
        resource_version: String,
        stream: queue_core::EventStream,
    },
}

/// Run the Watcher Loop forever.
pub async fn run(client: Arc<dyn OrchestratorClient>, store: ObjectStore, namespace_filter: NamespaceFilter) {
    let mut state = State::Disconnected;
    loop {
        state = step(&client, &store, &namespace_filter, state).await;
    }
}

async fn step(
    client: &Arc<dyn OrchestratorClient>,
    store: &ObjectStore,
    namespace_filter: &NamespaceFilter,
    state: State,
) -> State {
    match state {
        State::Disconnected => match client.list_all().await {
            Ok(listed) => {
                let count = listed.items.len();
                // Historical items: populate the Store, but never fire enforcement for them.
                store.replace_all(listed.items);
                tracing::info!(count, resource_version = %listed.resource_version, "store resynced from list");
                match client.watch_from(&listed.resource_version).await {
                    Ok(stream) => State::Streaming {
                        resource_version: listed.resource_version,
                        stream,
                    },
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to start watch after list, retrying after backoff");
                        tokio::time::sleep(STREAM_ERROR_BACKOFF).await;
                        State::Disconnected
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "initial list failed, retrying after backoff");
                tokio::time::sleep(STREAM_ERROR_BACKOFF).await;
                State::Disconnected
            }
        },
        State::Streaming {
            resource_version,
            mut stream,
        } => match stream.next().await {
            Some(Ok(event)) => {
                apply_event(store, &event);
                if let WatchEvent::Added(obj) | WatchEvent::Modified(obj) = &event {
                    enforcement_gate(client, store, namespace_filter, obj).await;
                }
                let next_rv = event.object().resource_version.clone().unwrap_or(resource_version);
                State::Streaming {
                    resource_version: next_rv,
                    stream,
                }
            }
            Some(Err(Error::ResourceVersionExpired)) => {
                tracing::info!("resource version expired, re-listing without backoff");
                State::Disconnected
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "watch stream error, reconnecting after backoff");
                tokio::time::sleep(STREAM_ERROR_BACKOFF).await;
                State::Disconnected
            }
            None => {
                tracing::info!("watch stream closed by peer, reconnecting after backoff");
                tokio::time::sleep(STREAM_ERROR_BACKOFF).await;
                State::Disconnected
            }
        },
    }
}

fn apply_event(store: &ObjectStore, event: &WatchEvent) {
    match event {
        WatchEvent::Deleted(obj) => store.remove(&obj.key),
        WatchEvent::Added(obj) | WatchEvent::Modified(obj) => store.upsert(obj.clone()),
    }
}

/// Evaluate the Enforcement Gate against a single `Added`/`Modified` object,
/// without any extra orchestrator calls beyond the optional label patch and
/// the limit read.
async fn enforcement_gate(
    client: &Arc<dyn OrchestratorClient>,
    store: &ObjectStore,
    namespace_filter: &NamespaceFilter,
    obj: &PipelineRun,
) {
    if !namespace_filter.is_managed(&obj.key.namespace) {
        tracing::trace!(key = %obj.key, "gate: namespace not managed, skipping");
        return;
    }
    if obj.is_terminal() {
        tracing::trace!(key = %obj.key, "gate: terminal, skipping");
        return;
    }
    if obj.is_paused() {
        tracing::trace!(key = %obj.key, "gate: already paused, nothing to enforce");
        return;
    }
    if !obj.is_managed() {
        if let Err(err) = client
            .patch_label(
                &obj.key.namespace,
                &obj.key.name,
                queue_core::model::MANAGED_LABEL,
                queue_core::model::MANAGED_LABEL_VALUE,
            )
            .await
        {
            tracing::warn!(key = %obj.key, error = %err, "gate: label patch failed, next event will retry");
        }
    }

    let running = classify(store.snapshot(), |ns| namespace_filter.is_managed(ns)).running_count() as u32;
    let limit = client.read_limit().await;
    if running > limit {
        tracing::info!(key = %obj.key, running, limit, "gate: over limit, invoking enforcement");
        enforcement::enforce(client, obj).await;
    }
}
