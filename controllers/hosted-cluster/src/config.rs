//! Controller configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ControllerError;
use crate::manifests::images;

/// Container images the controller deploys into control plane namespaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentImages {
    /// Control plane operator
    pub control_plane_operator: String,
    /// Ignition server
    pub ignition_server: String,
    /// Cluster API manager (default, overridable per cluster)
    pub cluster_api: String,
    /// Cluster API AWS provider
    pub capi_aws_provider: String,
    /// Cluster autoscaler (default, overridable per cluster)
    pub cluster_autoscaler: String,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Only watch HostedClusters in this namespace
    pub watch_namespace: Option<String>,
    /// Images for deployed components
    pub images: ComponentImages,
    /// Upper bound on a single reconcile
    pub reconcile_timeout: Duration,
    /// Recheck interval while teardown is in progress
    pub deletion_requeue: Duration,
    /// Periodic recheck of converged clusters
    pub resync_interval: Duration,
    /// Listen address of the probe and metrics server
    pub metrics_addr: SocketAddr,
}

impl ControllerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).filter(|v| !v.is_empty()).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{key} environment variable is required"))
            })
        };
        let or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let seconds = |key: &str, default: u64| -> Result<Duration, ControllerError> {
            match lookup(key).filter(|v| !v.is_empty()) {
                Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    ControllerError::InvalidConfig(format!("{key} must be a number of seconds: {e}"))
                }),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let metrics_addr = or_default("METRICS_BIND_ADDRESS", "0.0.0.0:8080")
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("METRICS_BIND_ADDRESS: {e}")))?;

        Ok(Self {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|v| !v.is_empty()),
            images: ComponentImages {
                control_plane_operator: required("CONTROL_PLANE_OPERATOR_IMAGE")?,
                ignition_server: required("IGNITION_SERVER_IMAGE")?,
                cluster_api: or_default("CLUSTER_API_IMAGE", images::CLUSTER_API),
                capi_aws_provider: or_default("CAPI_AWS_PROVIDER_IMAGE", images::CAPI_AWS_PROVIDER),
                cluster_autoscaler: or_default("CLUSTER_AUTOSCALER_IMAGE", images::CLUSTER_AUTOSCALER),
            },
            reconcile_timeout: seconds("RECONCILE_TIMEOUT_SECS", 60)?,
            deletion_requeue: seconds("DELETION_REQUEUE_SECS", 5)?,
            resync_interval: seconds("RESYNC_SECS", 600)?,
            metrics_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("CONTROL_PLANE_OPERATOR_IMAGE", "quay.io/hypershift/cpo:latest"),
            ("IGNITION_SERVER_IMAGE", "quay.io/hypershift/ignition:latest"),
        ]))
        .unwrap();

        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.images.cluster_api, images::CLUSTER_API);
        assert_eq!(config.deletion_requeue, Duration::from_secs(5));
        assert_eq!(config.reconcile_timeout, Duration::from_secs(60));
        assert_eq!(config.resync_interval, Duration::from_secs(600));
        assert_eq!(config.metrics_addr.port(), 8080);
    }

    #[test]
    fn test_missing_required_image() {
        let err = ControllerConfig::from_lookup(lookup(&[("IGNITION_SERVER_IMAGE", "img")])).unwrap_err();
        assert!(err.to_string().contains("CONTROL_PLANE_OPERATOR_IMAGE"));
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("CONTROL_PLANE_OPERATOR_IMAGE", "cpo"),
            ("IGNITION_SERVER_IMAGE", "ign"),
            ("WATCH_NAMESPACE", "clusters"),
            ("CLUSTER_AUTOSCALER_IMAGE", "autoscaler:dev"),
            ("DELETION_REQUEUE_SECS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.watch_namespace.as_deref(), Some("clusters"));
        assert_eq!(config.images.cluster_autoscaler, "autoscaler:dev");
        assert_eq!(config.deletion_requeue, Duration::from_secs(2));
    }

    #[test]
    fn test_bad_duration() {
        let err = ControllerConfig::from_lookup(lookup(&[
            ("CONTROL_PLANE_OPERATOR_IMAGE", "cpo"),
            ("IGNITION_SERVER_IMAGE", "ign"),
            ("RESYNC_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RESYNC_SECS"));
    }
}
