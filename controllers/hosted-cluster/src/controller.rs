//! Main controller implementation.
//!
//! Wires the reconciler to the cluster and runs two tasks side by side: the
//! HostedCluster watcher and the probe/metrics server. Either one exiting
//! stops the controller.

use std::sync::Arc;

use kube::Client;
use object_store::KubeStore;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::server::{self, ServerState};
use crate::watcher::{Context, Watcher};

/// Main controller for HostedCluster management.
pub struct Controller {
    hosted_cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing HostedCluster Controller");

        let kube_client = Client::try_default().await?;

        let metrics = Arc::new(Metrics::new()?);
        let reconciler = Reconciler::new(
            KubeStore::new(kube_client.clone()),
            ReconcilerSettings::from_config(&config),
        );
        let ctx = Arc::new(Context::new(
            reconciler,
            metrics.clone(),
            config.reconcile_timeout,
            config.resync_interval,
        ));
        let watcher = Watcher::new(ctx, kube_client, config.watch_namespace.clone());

        info!("Checking access to the HostedCluster API...");
        watcher.check_access().await?;
        info!("HostedCluster API reachable");

        let state = Arc::new(ServerState::new(metrics));
        state.set_ready();

        let hosted_cluster_watcher = tokio::spawn(async move { watcher.watch_hosted_clusters().await });
        let server = {
            let addr = config.metrics_addr;
            tokio::spawn(async move { server::serve(addr, state).await })
        };

        Ok(Self {
            hosted_cluster_watcher,
            server,
        })
    }

    /// Runs until the watcher stops (on shutdown signal) or a task fails.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("HostedCluster Controller running");

        tokio::select! {
            result = &mut self.hosted_cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("HostedCluster watcher panicked: {}", e)))??;
            }
            result = &mut self.server => {
                result.map_err(|e| ControllerError::Server(format!("probe server panicked: {}", e)))??;
            }
        }

        self.server.abort();
        info!("HostedCluster Controller stopped");
        Ok(())
    }
}
