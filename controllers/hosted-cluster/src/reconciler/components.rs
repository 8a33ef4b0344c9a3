//! Operators deployed into the control plane namespace: Cluster API manager,
//! the AWS provider, the autoscaler and the control plane operator.

use crds::{HostedCluster, HostedControlPlane};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use object_store::{ObjectKey, ObjectStore};
use tracing::debug;

use crate::builders::{Component, has_tls_material, tls_secret};
use crate::error::ControllerError;
use crate::manifests::{self, annotations, in_namespace, secrets};
use crate::pki::CertificateAuthority;
use crate::reconciler::Reconciler;

/// Image override from a HostedCluster annotation, else the default
pub(crate) fn image_override<'a>(hc: &'a HostedCluster, annotation: &str, default: &'a str) -> &'a str {
    hc.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotation))
        .map(String::as_str)
        .filter(|image| !image.is_empty())
        .unwrap_or(default)
}

/// Value of the restart-date annotation, if set
pub(crate) fn restart_date(hc: &HostedCluster) -> Option<&str> {
    hc.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::RESTART_DATE))
        .map(String::as_str)
}

impl<S: ObjectStore> Reconciler<S> {
    /// Service account, role and binding, plus cluster role and binding where needed
    pub(crate) async fn sync_component_rbac(
        &self,
        owner: &ObjectKey,
        cp_namespace: &str,
        component: Component,
    ) -> Result<(), ControllerError> {
        let key = in_namespace(cp_namespace, component.name());
        self.sync::<ServiceAccount, _>(owner, &key, |_| Ok(())).await?;
        self.sync::<Role, _>(owner, &key, |role| self.builders.role(role, component))
            .await?;
        self.sync::<RoleBinding, _>(owner, &key, |binding| {
            self.builders.role_binding(binding, component, cp_namespace)
        })
        .await?;

        let (Some(role_name), Some(binding_name)) = (
            component.cluster_role_name(cp_namespace),
            component.cluster_role_binding_name(cp_namespace),
        ) else {
            return Ok(());
        };
        let role_key = ObjectKey::cluster(&role_name);
        if component.shares_cluster_role() {
            self.sync_unowned::<ClusterRole, _>(&role_key, |role| self.builders.cluster_role(role, component))
                .await?;
        } else {
            self.sync::<ClusterRole, _>(owner, &role_key, |role| self.builders.cluster_role(role, component))
                .await?;
        }
        self.sync::<ClusterRoleBinding, _>(owner, &ObjectKey::cluster(&binding_name), |binding| {
            self.builders
                .cluster_role_binding(binding, component, &role_name, cp_namespace)
        })
        .await?;
        Ok(())
    }

    /// Cluster API manager with its webhook serving secret
    pub(crate) async fn sync_capi_manager(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
    ) -> Result<(), ControllerError> {
        self.sync::<Secret, _>(owner, &in_namespace(cp_namespace, secrets::CAPI_WEBHOOKS_TLS), |secret| {
            if has_tls_material(secret) {
                return Ok(());
            }
            let ca = CertificateAuthority::generate("capi-webhooks", "openshift")?;
            tls_secret(secret, ca.pair());
            Ok(())
        })
        .await?;

        let component = Component::ClusterApiManager;
        self.sync_component_rbac(owner, cp_namespace, component).await?;

        let image = image_override(hc, annotations::CAPI_MANAGER_IMAGE, &self.settings.images.cluster_api);
        self.sync::<Deployment, _>(owner, &in_namespace(cp_namespace, component.deployment_name()), |d| {
            self.builders.capi_manager_deployment(d, image)
        })
        .await?;
        Ok(())
    }

    /// Cluster API provider for AWS
    pub(crate) async fn sync_capi_aws_provider(
        &self,
        hc: &HostedCluster,
        cp_namespace: &str,
    ) -> Result<(), ControllerError> {
        let owner = Self::cluster_key(hc)?;
        let component = Component::CapiAwsProvider;
        self.sync_component_rbac(&owner, cp_namespace, component).await?;

        let image = &self.settings.images.capi_aws_provider;
        self.sync::<Deployment, _>(&owner, &in_namespace(cp_namespace, component.deployment_name()), |d| {
            self.builders.capi_aws_provider_deployment(d, image)
        })
        .await?;
        Ok(())
    }

    /// Autoscaler; the deployment waits for the guest cluster kubeconfig
    pub(crate) async fn sync_autoscaler(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
        hcp: &HostedControlPlane,
    ) -> Result<(), ControllerError> {
        let component = Component::Autoscaler;
        self.sync_component_rbac(owner, cp_namespace, component).await?;

        if hcp.status.as_ref().and_then(|s| s.kube_config.as_ref()).is_none() {
            debug!("HostedCluster {}: autoscaler waits for the control plane kubeconfig", owner);
            return Ok(());
        }
        let kubeconfig_secret = manifests::capi_kubeconfig_secret_name(&hc.spec.infra_id);
        if self
            .store
            .get::<Secret>(&in_namespace(cp_namespace, &kubeconfig_secret))
            .await?
            .is_none()
        {
            debug!("HostedCluster {}: autoscaler waits for secret {}", owner, kubeconfig_secret);
            return Ok(());
        }

        let image = image_override(
            hc,
            annotations::CLUSTER_AUTOSCALER_IMAGE,
            &self.settings.images.cluster_autoscaler,
        );
        self.sync::<Deployment, _>(owner, &in_namespace(cp_namespace, component.deployment_name()), |d| {
            self.builders
                .autoscaler_deployment(d, image, &kubeconfig_secret, &hc.spec.autoscaling)
        })
        .await?;
        Ok(())
    }

    /// Control plane operator
    pub(crate) async fn sync_control_plane_operator(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
    ) -> Result<(), ControllerError> {
        let component = Component::ControlPlaneOperator;
        self.sync_component_rbac(owner, cp_namespace, component).await?;

        let image = &self.settings.images.control_plane_operator;
        let restart = restart_date(hc);
        self.sync::<Deployment, _>(owner, &in_namespace(cp_namespace, component.deployment_name()), |d| {
            self.builders.control_plane_operator_deployment(d, image, restart)
        })
        .await?;
        Ok(())
    }
}
