//! Entry point: discover cluster credentials, read configuration, and run
//! the Watcher Loop and Manager Loop concurrently against the shared Object
//! Store.

mod config;
mod conversion;
mod enforcement;
mod kube_client;
mod manager;
mod watcher;

use std::sync::Arc;

use queue_core::{NamespaceFilter, ObjectStore, OrchestratorClient};

use crate::config::Config;
use crate::kube_client::KubeOrchestratorClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    tracing::info!(
        namespace_glob = config.namespace_filter.pattern(),
        manager_tick_secs = config.manager_tick.as_secs(),
        default_limit = config.default_limit,
        "starting queue controller"
    );

    let kube_client = kube::Client::try_default()
        .await
        .map_err(|err| anyhow::anyhow!("failed to discover cluster credentials: {err}"))?;

    let orchestrator: Arc<dyn OrchestratorClient> = Arc::new(KubeOrchestratorClient::new(kube_client, &config));
    let store = ObjectStore::new();

    run(orchestrator, store, config).await;
    Ok(())
}

/// Spawn the Watcher and Manager loops and wait for either to exit or for a
/// shutdown signal. Neither loop is expected to return during normal
/// operation; a panic in either is treated as fatal (diagnostic,
/// non-graceful shutdown).
async fn run(orchestrator: Arc<dyn OrchestratorClient>, store: ObjectStore, config: Config) {
    let namespace_filter: NamespaceFilter = config.namespace_filter;

    let watcher_handle = tokio::spawn(watcher::run(orchestrator.clone(), store.clone(), namespace_filter.clone()));
    let manager_handle = tokio::spawn(manager::run(orchestrator, store, namespace_filter, config.manager_tick));

    tokio::select! {
        result = watcher_handle => {
            tracing::error!(?result, "watcher loop exited unexpectedly, shutting down");
        }
        result = manager_handle => {
            tracing::error!(?result, "manager loop exited unexpectedly, shutting down");
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, exiting");
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
