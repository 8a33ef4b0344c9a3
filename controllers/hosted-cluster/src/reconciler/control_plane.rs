//! HostedControlPlane, infrastructure record, Cluster API `Cluster` and the
//! published admin kubeconfig.

use crds::{APIEndpoint, Cluster, HostedCluster, HostedControlPlane, TypedObjectReference};
use k8s_openapi::api::core::v1::Secret;
use object_store::{ObjectKey, ObjectStore, OperationResult, StoreObject};
use tracing::{debug, info};

use crate::builders::publish_kubeconfig;
use crate::error::ControllerError;
use crate::manifests::{self, in_namespace};
use crate::platform::PlatformSupport;
use crate::reconciler::Reconciler;

impl<S: ObjectStore> Reconciler<S> {
    /// Create-or-update the HostedControlPlane, then read it back with its status
    pub(crate) async fn sync_control_plane(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
        platform: &dyn PlatformSupport<S>,
    ) -> Result<HostedControlPlane, ControllerError> {
        let platform_spec = platform.control_plane_platform(hc);
        let key = in_namespace(cp_namespace, &owner.name);

        let (_, result) = self
            .sync::<HostedControlPlane, _>(owner, &key, |hcp| {
                self.builders.hosted_control_plane(hcp, hc, &platform_spec)
            })
            .await?;
        if result == OperationResult::Created {
            info!("HostedCluster {}: created HostedControlPlane {}", owner, key);
        }

        // status is written by the control plane operator, not by us
        self.store
            .get::<HostedControlPlane>(&key)
            .await?
            .ok_or_else(|| ControllerError::MissingDependency(format!("HostedControlPlane {key} not found")))
    }

    /// Create-or-patch the platform's infrastructure record once the
    /// control plane has an endpoint
    ///
    /// Before that, an existing record is still referenced so the Cluster
    /// API `Cluster` can be linked to it.
    pub(crate) async fn sync_infrastructure<K, F>(
        &self,
        hc: &HostedCluster,
        cp_namespace: &str,
        endpoint: &APIEndpoint,
        build: F,
    ) -> Result<Option<TypedObjectReference>, ControllerError>
    where
        K: StoreObject,
        F: FnMut(&mut K) -> Result<(), ControllerError> + Send,
    {
        let owner = Self::cluster_key(hc)?;
        let key = in_namespace(cp_namespace, &owner.name);
        let reference = TypedObjectReference::for_resource::<K>(cp_namespace, &owner.name);

        if !endpoint.is_set() {
            let existing = self.store.get::<K>(&key).await?;
            return Ok(existing.map(|_| reference));
        }
        self.sync_patch::<K, _>(&owner, &key, build).await?;
        Ok(Some(reference))
    }

    /// Create the Cluster API `Cluster` linking control plane and infrastructure
    ///
    /// The record is never written again after creation.
    pub(crate) async fn sync_capi_cluster(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
        control_plane: &TypedObjectReference,
        infrastructure: &TypedObjectReference,
    ) -> Result<(), ControllerError> {
        let key = in_namespace(cp_namespace, &hc.spec.infra_id);
        // Cluster API owns the record once it exists
        if self.store.get::<Cluster>(&key).await?.is_some() {
            return Ok(());
        }
        let (_, result) = self
            .sync::<Cluster, _>(owner, &key, |cluster| {
                self.builders.capi_cluster(cluster, control_plane, infrastructure)
            })
            .await?;
        if result == OperationResult::Created {
            info!("HostedCluster {}: created Cluster {}", owner, key);
        }
        Ok(())
    }

    /// Publish the control plane's admin kubeconfig next to the HostedCluster
    pub(crate) async fn sync_kubeconfig(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
        hcp: &HostedControlPlane,
    ) -> Result<(), ControllerError> {
        let Some(reference) = hcp.status.as_ref().and_then(|s| s.kube_config.as_ref()) else {
            debug!("HostedCluster {}: control plane has not reported a kubeconfig yet", owner);
            return Ok(());
        };

        let source_key = in_namespace(cp_namespace, &reference.name);
        let source = self
            .store
            .get::<Secret>(&source_key)
            .await?
            .ok_or_else(|| ControllerError::MissingDependency(format!("kubeconfig secret {source_key} not found")))?;
        let kubeconfig = source
            .data
            .and_then(|mut data| data.remove(&reference.key))
            .ok_or_else(|| {
                ControllerError::MissingDependency(format!(
                    "kubeconfig secret {} has no {} key",
                    source_key, reference.key
                ))
            })?;

        let namespace = owner.namespace.as_deref().unwrap_or_default();
        let target = ObjectKey::namespaced(namespace, manifests::kubeconfig_secret_name(&owner.name));
        self.sync::<Secret, _>(owner, &target, |secret| publish_kubeconfig(secret, &kubeconfig, hc))
            .await?;
        Ok(())
    }
}
