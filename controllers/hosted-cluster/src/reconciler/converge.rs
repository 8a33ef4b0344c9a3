//! Converge pass: every dependent of a HostedCluster, in dependency order.

use std::collections::BTreeMap;

use crds::{HostedCluster, HostedControlPlane, TypedObjectReference};
use k8s_openapi::api::core::v1::Namespace;
use object_store::{ObjectKey, ObjectStore};
use tracing::{debug, info};

use crate::error::ControllerError;
use crate::manifests;
use crate::platform::platform_support;
use crate::reconciler::Reconciler;

/// Label marking namespaces that host a control plane
pub const CONTROL_PLANE_NAMESPACE_LABEL: &str = "hypershift.openshift.io/hosted-control-plane";

/// Reject specs that cannot possibly converge
pub(crate) fn validate_spec(hc: &HostedCluster) -> Result<(), ControllerError> {
    if hc.spec.pull_secret.specified().is_none() {
        return Err(ControllerError::InvalidConfig("spec.pullSecret.name is required".to_string()));
    }
    if hc.spec.infra_id.is_empty() {
        return Err(ControllerError::InvalidConfig("spec.infraID is required".to_string()));
    }
    if hc.spec.release.image.is_empty() {
        return Err(ControllerError::InvalidConfig("spec.release.image is required".to_string()));
    }
    Ok(())
}

impl<S: ObjectStore> Reconciler<S> {
    /// Bring every dependent of `hc` in line with its spec
    ///
    /// Steps that wait on something observed later (control plane endpoint,
    /// kubeconfig, route host) are skipped without error; the change that
    /// unblocks them triggers the next pass.
    pub(crate) async fn converge(&self, hc: &HostedCluster) -> Result<(), ControllerError> {
        validate_spec(hc)?;
        let owner = Self::cluster_key(hc)?;
        let namespace = owner.namespace.clone().unwrap_or_default();
        let cp_namespace = manifests::control_plane_namespace(&namespace, &owner.name);
        let platform = platform_support::<S>(hc.spec.platform.r#type);
        debug!("HostedCluster {}: converging on {:?} platform", owner, platform.platform_type());

        self.sync::<Namespace, _>(&owner, &ObjectKey::cluster(&cp_namespace), |ns| {
            ns.metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert(CONTROL_PLANE_NAMESPACE_LABEL.to_string(), "true".to_string());
            Ok(())
        })
        .await?;

        self.sync_credentials(hc, &owner, &cp_namespace, platform.as_ref()).await?;
        self.sync_global_config(hc, &owner, &cp_namespace).await?;

        let hcp = self.sync_control_plane(hc, &owner, &cp_namespace, platform.as_ref()).await?;
        let endpoint = hcp
            .status
            .as_ref()
            .map(|s| s.control_plane_endpoint.clone())
            .unwrap_or_default();

        let infrastructure = platform
            .reconcile_infrastructure(self, hc, &cp_namespace, &endpoint)
            .await?;
        match infrastructure {
            Some(infrastructure) => {
                let control_plane = TypedObjectReference::for_resource::<HostedControlPlane>(&cp_namespace, &owner.name);
                self.sync_capi_cluster(hc, &owner, &cp_namespace, &control_plane, &infrastructure)
                    .await?;
            }
            None => debug!("HostedCluster {}: waiting for control plane endpoint", owner),
        }

        self.sync_kubeconfig(hc, &owner, &cp_namespace, &hcp).await?;

        self.sync_capi_manager(hc, &owner, &cp_namespace).await?;
        platform.reconcile_provider(self, hc, &cp_namespace).await?;
        self.sync_autoscaler(hc, &owner, &cp_namespace, &hcp).await?;
        self.sync_control_plane_operator(hc, &owner, &cp_namespace).await?;

        self.sync_ignition(hc, &owner, &cp_namespace).await?;

        info!("HostedCluster {}: converged", owner);
        Ok(())
    }
}
