//! Status aggregation for HostedClusters.
//!
//! Reads the HostedControlPlane and the objects that back each condition and
//! folds them into a new `HostedClusterStatus`. The compute functions are
//! pure so the rollout state machine and the condition truth tables can be
//! tested without a store.

use chrono::{DateTime, Utc};
use crds::conditions::{reasons, types};
use crds::{
    ClusterVersionStatus, Condition, ConditionStatus, EtcdManagementType, HostedCluster,
    HostedClusterStatus, HostedControlPlane, LocalObjectReference, PublishingStrategyType,
    UpdateHistory, UpdateState, find_status_condition, is_status_condition_true, services,
    set_status_condition,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use object_store::{ObjectKey, ObjectStore};
use tracing::{debug, info};

use crate::builders::Component;
use crate::error::ControllerError;
use crate::manifests::{self, keys};
use crate::reconciler::Reconciler;

/// Freshly computed status plus any configuration problem found on the way
#[derive(Debug)]
pub(crate) struct StatusReport {
    pub status: HostedClusterStatus,
    pub config_error: Option<ControllerError>,
}

/// Advance the version rollout state machine
///
/// Starts a history with a `Partial` entry for the requested release,
/// completes the head entry once the control plane reports that its spec
/// and status release images agree, and prepends a new `Partial` entry when
/// the requested release differs from `desired`.
pub(crate) fn compute_cluster_version_status(
    now: DateTime<Utc>,
    hc: &HostedCluster,
    hcp: Option<&HostedControlPlane>,
) -> ClusterVersionStatus {
    let requested = &hc.spec.release.image;
    let generation = hc.metadata.generation.unwrap_or_default();

    let current = hc
        .status
        .as_ref()
        .and_then(|s| s.version.as_ref())
        .filter(|v| !v.history.is_empty());
    let Some(current) = current else {
        return ClusterVersionStatus {
            desired: hc.spec.release.clone(),
            observed_generation: generation,
            history: vec![partial(requested, now)],
        };
    };

    let mut version = current.clone();
    let Some(hcp) = hcp else {
        return version;
    };
    let hcp_status = hcp.status.clone().unwrap_or_default();
    if hcp.spec.release_image != hcp_status.release_image {
        return version;
    }

    // head counts as rolled out whenever the control plane has settled,
    // even if it settled on an older image
    if let Some(head) = version.history.first_mut() {
        head.state = UpdateState::Completed;
        head.version = hcp_status.version;
        if let Some(at) = hcp_status.last_release_image_transition_time {
            head.completion_time = Some(at);
        }
    }

    if *requested != version.desired.image {
        version.desired.image.clone_from(requested);
        version.observed_generation = generation;
        version.history.insert(0, partial(requested, now));
    }
    version
}

fn partial(image: &str, now: DateTime<Utc>) -> UpdateHistory {
    UpdateHistory {
        state: UpdateState::Partial,
        started_time: now,
        completion_time: None,
        version: String::new(),
        image: image.to_string(),
        verified: false,
    }
}

/// Aggregate availability of the hosted cluster
///
/// `status` must already carry this pass's kubeconfig and etcd results.
pub(crate) fn compute_availability(
    hc: &HostedCluster,
    hcp: Option<&HostedControlPlane>,
    status: &HostedClusterStatus,
) -> Condition {
    let hcp_available = hcp
        .and_then(|h| h.status.as_ref())
        .is_some_and(|s| is_status_condition_true(&s.conditions, types::HOSTED_CONTROL_PLANE_AVAILABLE));
    let kubeconfig_available = status.kubeconfig.is_some();
    let etcd_available = match hc.spec.etcd.management_type {
        EtcdManagementType::Managed => true,
        EtcdManagementType::Unmanaged => {
            is_status_condition_true(&status.conditions, types::UNMANAGED_ETCD_AVAILABLE)
        }
    };

    let generation = hc.metadata.generation;
    if hcp_available && kubeconfig_available && etcd_available {
        return Condition::new(
            types::HOSTED_CLUSTER_AVAILABLE,
            ConditionStatus::True,
            reasons::HOSTED_CLUSTER_AS_EXPECTED,
        )
        .with_generation(generation);
    }

    let mut problems = Vec::new();
    if !hcp_available {
        problems.push("control plane unavailable");
    }
    if !kubeconfig_available {
        problems.push("kubeconfig unavailable");
    }
    if !etcd_available {
        problems.push("etcd unavailable");
    }
    Condition::new(
        types::HOSTED_CLUSTER_AVAILABLE,
        ConditionStatus::False,
        reasons::UNHEALTHY_COMPONENTS,
    )
    .with_message(problems.join("; "))
    .with_generation(generation)
}

/// Validate the unmanaged etcd connection details; first failing check wins
pub(crate) fn compute_unmanaged_etcd_condition(hc: &HostedCluster, secret: Option<&Secret>) -> Condition {
    let generation = hc.metadata.generation;
    let misconfigured = |message: String| {
        Condition::new(
            types::UNMANAGED_ETCD_AVAILABLE,
            ConditionStatus::False,
            reasons::UNMANAGED_ETCD_MISCONFIGURED,
        )
        .with_message(message)
        .with_generation(generation)
    };
    let no_metadata = || "etcd metadata not specified for unmanaged deployment".to_string();

    let unmanaged = hc.spec.etcd.unmanaged.as_ref();
    let Some((unmanaged, name)) = unmanaged.and_then(|u| u.tls.client_secret.specified().map(|n| (u, n)))
    else {
        return misconfigured(no_metadata());
    };
    let Some(secret) = secret else {
        return misconfigured(format!("missing TLS client secret {name}"));
    };
    if unmanaged.endpoint.is_empty() {
        return misconfigured(no_metadata());
    }

    let has = |key: &str| secret.data.as_ref().is_some_and(|d| d.contains_key(key));
    for (key, what) in [
        (keys::ETCD_CLIENT_CERT, "client cert"),
        (keys::ETCD_CLIENT_KEY, "client key"),
        (keys::ETCD_CLIENT_CA, "client ca"),
    ] {
        if !has(key) {
            return misconfigured(format!("etcd secret {name} does not have {what} key {key}"));
        }
    }

    Condition::new(
        types::UNMANAGED_ETCD_AVAILABLE,
        ConditionStatus::True,
        reasons::UNMANAGED_ETCD_AS_EXPECTED,
    )
    .with_generation(generation)
}

/// Mirror the control plane's own configuration verdict
pub(crate) fn compute_valid_configuration(hc: &HostedCluster, hcp: Option<&HostedControlPlane>) -> Condition {
    let mut condition = Condition::new(
        types::VALID_HOSTED_CLUSTER_CONFIGURATION,
        ConditionStatus::Unknown,
        reasons::STATUS_UNKNOWN,
    )
    .with_generation(hc.metadata.generation);

    let reported = hcp
        .and_then(|h| h.status.as_ref())
        .and_then(|s| find_status_condition(&s.conditions, types::VALID_CONFIGURATION));
    if let Some(reported) = reported {
        condition.status = reported.status;
        condition.reason.clone_from(&reported.reason);
        condition.message.clone_from(&reported.message);
    }
    condition
}

/// Availability of the ignition server deployment
pub(crate) fn compute_ignition_availability(hc: &HostedCluster, deployment: Option<&Deployment>) -> Condition {
    let generation = hc.metadata.generation;
    let Some(deployment) = deployment else {
        return Condition::new(
            types::IGNITION_ENDPOINT_AVAILABLE,
            ConditionStatus::False,
            reasons::IGNITION_DEPLOYMENT_NOT_FOUND,
        )
        .with_generation(generation);
    };

    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        });
    let (status, reason) = if available {
        (ConditionStatus::True, reasons::IGNITION_DEPLOYMENT_AS_EXPECTED)
    } else {
        (ConditionStatus::False, reasons::IGNITION_DEPLOYMENT_UNAVAILABLE)
    };
    Condition::new(types::IGNITION_ENDPOINT_AVAILABLE, status, reason).with_generation(generation)
}

/// First allocated node port of a service
pub(crate) fn first_node_port(service: &Service) -> Option<i32> {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.first())
        .and_then(|p| p.node_port)
        .filter(|port| *port > 0)
}

fn log_rollout(key: &ObjectKey, before: Option<&ClusterVersionStatus>, after: &ClusterVersionStatus) {
    let Some(head) = after.head() else {
        return;
    };
    let previous = before.and_then(ClusterVersionStatus::head);
    if previous.map(|h| (&h.image, h.started_time)) != Some((&head.image, head.started_time)) {
        info!("HostedCluster {}: rollout of {} started", key, head.image);
    } else if head.state == UpdateState::Completed && previous.is_some_and(|h| h.state == UpdateState::Partial) {
        info!("HostedCluster {}: rollout of {} completed (version {})", key, head.image, head.version);
    }
}

impl<S: ObjectStore> Reconciler<S> {
    /// Compute the status block for `hc` from the current state of its dependents
    pub(crate) async fn aggregate_status(&self, hc: &HostedCluster) -> Result<StatusReport, ControllerError> {
        let key = Self::cluster_key(hc)?;
        let namespace = key.namespace.clone().unwrap_or_default();
        let cp_namespace = manifests::control_plane_namespace(&namespace, &key.name);
        let now = self.clock.now();
        let mut status = hc.status.clone().unwrap_or_default();
        let mut config_error = None;

        let kubeconfig_name = manifests::kubeconfig_secret_name(&key.name);
        let kubeconfig = self
            .store
            .get::<Secret>(&ObjectKey::namespaced(&namespace, &kubeconfig_name))
            .await?;
        status.kubeconfig = kubeconfig.map(|_| LocalObjectReference::new(kubeconfig_name));

        let hcp = self
            .store
            .get::<HostedControlPlane>(&ObjectKey::namespaced(&cp_namespace, &key.name))
            .await?;

        let version = compute_cluster_version_status(now, hc, hcp.as_ref());
        log_rollout(&key, status.version.as_ref(), &version);
        status.version = Some(version);

        if hc.spec.etcd.management_type == EtcdManagementType::Unmanaged {
            let secret_name = hc
                .spec
                .etcd
                .unmanaged
                .as_ref()
                .and_then(|u| u.tls.client_secret.specified());
            let secret = match secret_name {
                Some(name) => {
                    self.store
                        .get::<Secret>(&ObjectKey::namespaced(&namespace, name))
                        .await?
                }
                None => None,
            };
            let condition = compute_unmanaged_etcd_condition(hc, secret.as_ref());
            set_status_condition(&mut status.conditions, condition, now);
        }

        let available = compute_availability(hc, hcp.as_ref(), &status);
        set_status_condition(&mut status.conditions, available, now);
        set_status_condition(&mut status.conditions, compute_valid_configuration(hc, hcp.as_ref()), now);

        match hc.publishing_strategy(services::IGNITION) {
            None => {
                config_error = Some(ControllerError::InvalidConfig(
                    "Ignition service strategy not specified".to_string(),
                ));
            }
            Some(strategy) => match strategy.strategy_type() {
                PublishingStrategyType::Route => {
                    let route = self
                        .store
                        .get::<crds::Route>(&ObjectKey::namespaced(&cp_namespace, Component::IgnitionServer.name()))
                        .await?;
                    if let Some(host) = route.map(|r| r.spec.host).filter(|h| !h.is_empty()) {
                        status.ignition_endpoint = Some(host);
                    }
                }
                PublishingStrategyType::NodePort => match &strategy.node_port {
                    None => {
                        config_error = Some(ControllerError::InvalidConfig(
                            "nodeport metadata not specified for ignition service".to_string(),
                        ));
                    }
                    Some(node_port) => {
                        let service = self
                            .store
                            .get::<Service>(&ObjectKey::namespaced(&cp_namespace, Component::IgnitionServer.name()))
                            .await?;
                        if let Some(port) = service.as_ref().and_then(first_node_port) {
                            status.ignition_endpoint = Some(format!("{}:{}", node_port.address, port));
                        }
                    }
                },
                _ => {
                    config_error = Some(ControllerError::InvalidConfig(format!(
                        "unknown service strategy type for ignition service: {}",
                        strategy.r#type
                    )));
                }
            },
        }

        let deployment = self
            .store
            .get::<Deployment>(&ObjectKey::namespaced(&cp_namespace, Component::IgnitionServer.name()))
            .await?;
        set_status_condition(
            &mut status.conditions,
            compute_ignition_availability(hc, deployment.as_ref()),
            now,
        );

        debug!("HostedCluster {}: status computed", key);
        Ok(StatusReport { status, config_error })
    }

    /// Write `status` if it differs; `None` on a write conflict
    pub(crate) async fn write_status(
        &self,
        hc: HostedCluster,
        status: HostedClusterStatus,
    ) -> Result<Option<HostedCluster>, ControllerError> {
        if hc.status.as_ref() == Some(&status) {
            return Ok(Some(hc));
        }
        let mut updated = hc;
        updated.status = Some(status);
        match self.store.update_status(&updated).await {
            Ok(written) => Ok(Some(written)),
            Err(e) if e.is_conflict() => {
                debug!("HostedCluster status write conflicted, will requeue");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
