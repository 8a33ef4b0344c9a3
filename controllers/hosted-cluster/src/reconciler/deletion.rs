//! Ordered teardown of a HostedCluster's dependents.
//!
//! 1. NodePools of the cluster
//! 2. the Cluster API `Cluster`, when an infra ID was assigned
//! 3. the control plane namespace, cascading everything inside
//! 4. per-cluster cluster-scoped RBAC
//!
//! Each step waits for the previous one to be confirmed gone. Nothing is
//! remembered between passes; every pass starts again from step 1.

use crds::{Cluster, HostedCluster, NodePool};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use object_store::{DeleteOutcome, ObjectKey, ObjectStore, StoreObject};
use tracing::{debug, info};

use crate::builders::Component;
use crate::error::{ControllerError, ResultExt};
use crate::manifests;
use crate::reconciler::Reconciler;

impl<S: ObjectStore> Reconciler<S> {
    /// Advance teardown; `true` once nothing is left
    ///
    /// `hc` is `None` when the HostedCluster itself is already gone; the
    /// Cluster API step is then skipped since the infra ID is unknown.
    pub(crate) async fn delete_cluster(
        &self,
        key: &ObjectKey,
        hc: Option<&HostedCluster>,
    ) -> Result<bool, ControllerError> {
        let namespace = key
            .namespace
            .as_deref()
            .ok_or_else(|| ControllerError::Build(format!("HostedCluster key {key} has no namespace")))?;
        let cp_namespace = manifests::control_plane_namespace(namespace, &key.name);

        let node_pools: Vec<NodePool> = self
            .store
            .list::<NodePool>(Some(namespace))
            .await?
            .into_iter()
            .filter(|np| np.spec.cluster_name == key.name)
            .collect();
        if !node_pools.is_empty() {
            for pool in &node_pools {
                if let Some(pool_key) = ObjectKey::from_resource(pool) {
                    self.delete::<NodePool>(&pool_key).await?;
                    info!("HostedCluster {}: deleted NodePool {}", key, pool_key);
                }
            }
            return Ok(false);
        }

        let infra_id = hc.map(|h| h.spec.infra_id.as_str()).filter(|id| !id.is_empty());
        if let Some(infra_id) = infra_id {
            let cluster_key = manifests::in_namespace(&cp_namespace, infra_id);
            if self.delete::<Cluster>(&cluster_key).await? == DeleteOutcome::Deleted {
                info!("HostedCluster {}: waiting for Cluster {} to be removed", key, cluster_key);
                return Ok(false);
            }
        }

        let namespace_key = ObjectKey::cluster(&cp_namespace);
        if self.delete::<Namespace>(&namespace_key).await? == DeleteOutcome::Deleted {
            info!("HostedCluster {}: waiting for namespace {} to be removed", key, cp_namespace);
            return Ok(false);
        }

        for component in [Component::ClusterApiManager, Component::ControlPlaneOperator] {
            if let Some(name) = component.cluster_role_binding_name(&cp_namespace) {
                self.delete::<ClusterRoleBinding>(&ObjectKey::cluster(name)).await?;
            }
            if component.shares_cluster_role() {
                continue;
            }
            if let Some(name) = component.cluster_role_name(&cp_namespace) {
                self.delete::<ClusterRole>(&ObjectKey::cluster(name)).await?;
            }
        }

        debug!("HostedCluster {}: all dependents removed", key);
        Ok(true)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<DeleteOutcome, ControllerError> {
        let kind = K::kind(&());
        self.store
            .delete::<K>(key)
            .await
            .with_context(|| format!("delete {kind} {key}"))
    }
}
