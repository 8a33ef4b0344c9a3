//! HostedCluster Controller
//!
//! Converges each HostedCluster into a running hosted control plane:
//! - a control plane namespace with copied credentials and generated PKI
//! - the HostedControlPlane record and the Cluster API records
//! - Cluster API, provider, autoscaler, control plane operator and
//!   ignition server deployments
//!
//! and reports rollout progress and availability back on the HostedCluster
//! status. Deleting a HostedCluster tears all of it down in order.

mod backoff;
mod builders;
mod clock;
mod config;
mod controller;
mod error;
mod manifests;
mod metrics;
mod pki;
mod platform;
mod reconciler;
mod server;
mod watcher;

#[cfg(test)]
mod test_utils;

use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ControllerConfig;
use crate::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting HostedCluster Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Control plane operator image: {}", config.images.control_plane_operator);
    info!("  Ignition server image: {}", config.images.ignition_server);
    info!("  Cluster API image: {}", config.images.cluster_api);
    info!("  Cluster API AWS provider image: {}", config.images.capi_aws_provider);
    info!("  Cluster autoscaler image: {}", config.images.cluster_autoscaler);
    info!("  Reconcile timeout: {:?}", config.reconcile_timeout);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Metrics address: {}", config.metrics_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
