//! Desired-state builders for every resource the converger writes.
//!
//! Builders are mutate functions: they receive the current object (or a
//! blank one carrying only its key) and set the fields the controller owns.
//! [`ResourceBuilders`] groups them as an overridable capability table; the
//! reconciler only ever calls through it.

mod control_plane;
mod deployments;
mod ignition;
mod rbac;
mod secrets;

use std::collections::BTreeMap;

use crds::{
    APIEndpoint, AWSCluster, Cluster, ClusterAutoscaling, HostedCluster, HostedControlPlane,
    IBMCluster, PlatformSpec, Route, ServicePublishingStrategy, TypedObjectReference,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, ObjectFieldSelector, ResourceRequirements, SecretVolumeSource, Service,
    Toleration, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::ControllerError;

pub use rbac::Component;
pub use secrets::{CopiedContent, DOCKER_CONFIG_JSON_TYPE, SecretCopy};
pub(crate) use secrets::{
    copy_secret, has_tls_material, mirror_config_map, mirror_secret, publish_kubeconfig, tls_secret,
};

/// Capability table of resource builders
///
/// Every method has a default implementation; tests and alternative
/// deployments override individual entries.
pub trait ResourceBuilders: Send + Sync {
    /// HostedControlPlane derived from the HostedCluster
    fn hosted_control_plane(
        &self,
        hcp: &mut HostedControlPlane,
        hc: &HostedCluster,
        platform: &PlatformSpec,
    ) -> Result<(), ControllerError> {
        control_plane::hosted_control_plane(hcp, hc, platform)
    }

    /// Cluster API `Cluster` linking control plane and infrastructure
    fn capi_cluster(
        &self,
        cluster: &mut Cluster,
        control_plane: &TypedObjectReference,
        infrastructure: &TypedObjectReference,
    ) -> Result<(), ControllerError> {
        control_plane::capi_cluster(cluster, control_plane, infrastructure);
        Ok(())
    }

    /// Externally managed AWS infrastructure record
    fn aws_cluster(
        &self,
        infra: &mut AWSCluster,
        hc: &HostedCluster,
        endpoint: &APIEndpoint,
    ) -> Result<(), ControllerError> {
        control_plane::aws_cluster(infra, hc, endpoint);
        Ok(())
    }

    /// Externally managed IBM Cloud infrastructure record
    fn ibm_cluster(&self, infra: &mut IBMCluster, endpoint: &APIEndpoint) -> Result<(), ControllerError> {
        control_plane::ibm_cluster(infra, endpoint);
        Ok(())
    }

    /// Namespaced permissions of a component
    fn role(&self, role: &mut Role, component: Component) -> Result<(), ControllerError> {
        rbac::role(role, component);
        Ok(())
    }

    /// Binds a component's role to its service account
    fn role_binding(
        &self,
        binding: &mut RoleBinding,
        component: Component,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        rbac::role_binding(binding, component, namespace);
        Ok(())
    }

    /// Cluster-wide permissions of a component
    fn cluster_role(&self, role: &mut ClusterRole, component: Component) -> Result<(), ControllerError> {
        rbac::cluster_role(role, component);
        Ok(())
    }

    /// Binds a component's cluster role to its service account
    fn cluster_role_binding(
        &self,
        binding: &mut ClusterRoleBinding,
        component: Component,
        cluster_role: &str,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        rbac::cluster_role_binding(binding, component, cluster_role, namespace);
        Ok(())
    }

    /// Cluster API manager
    fn capi_manager_deployment(&self, deployment: &mut Deployment, image: &str) -> Result<(), ControllerError> {
        deployments::capi_manager(deployment, image);
        Ok(())
    }

    /// Cluster API AWS provider
    fn capi_aws_provider_deployment(
        &self,
        deployment: &mut Deployment,
        image: &str,
    ) -> Result<(), ControllerError> {
        deployments::capi_aws_provider(deployment, image);
        Ok(())
    }

    /// Cluster autoscaler targeting the guest cluster
    fn autoscaler_deployment(
        &self,
        deployment: &mut Deployment,
        image: &str,
        kubeconfig_secret: &str,
        options: &ClusterAutoscaling,
    ) -> Result<(), ControllerError> {
        deployments::autoscaler(deployment, image, kubeconfig_secret, options);
        Ok(())
    }

    /// Control plane operator
    fn control_plane_operator_deployment(
        &self,
        deployment: &mut Deployment,
        image: &str,
        restart_date: Option<&str>,
    ) -> Result<(), ControllerError> {
        deployments::control_plane_operator(deployment, image, restart_date);
        Ok(())
    }

    /// Ignition server service, shaped by the publishing strategy
    fn ignition_service(
        &self,
        service: &mut Service,
        strategy: &ServicePublishingStrategy,
    ) -> Result<(), ControllerError> {
        ignition::service(service, strategy)
    }

    /// Passthrough route in front of the ignition service
    fn ignition_route(&self, route: &mut Route) -> Result<(), ControllerError> {
        ignition::route(route);
        Ok(())
    }

    /// Ignition server
    fn ignition_deployment(
        &self,
        deployment: &mut Deployment,
        image: &str,
        restart_date: Option<&str>,
    ) -> Result<(), ControllerError> {
        ignition::deployment(deployment, image, restart_date);
        Ok(())
    }
}

/// Builders as shipped
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBuilders;

impl ResourceBuilders for DefaultBuilders {}

pub(crate) fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub(crate) fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// `MY_NAMESPACE` from the downward API
pub(crate) fn namespace_env() -> EnvVar {
    EnvVar {
        name: "MY_NAMESPACE".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "metadata.namespace".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn master_toleration() -> Toleration {
    Toleration {
        key: Some("node-role.kubernetes.io/master".to_string()),
        effect: Some("NoSchedule".to_string()),
        ..Default::default()
    }
}

pub(crate) fn requests(memory: &str, cpu: &str) -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("memory".to_string(), Quantity(memory.to_string())),
            ("cpu".to_string(), Quantity(cpu.to_string())),
        ])),
        ..Default::default()
    }
}

pub(crate) fn secret_volume(name: &str, secret_name: &str, default_mode: Option<i32>) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            default_mode,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}
