//! HostedControlPlane CRD
//!
//! Per-cluster control plane record living in the control-plane namespace.
//! Its spec is derived from the owning HostedCluster; its status is written
//! by the control plane operator and read back to aggregate health and
//! rollout progress.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    APIEndpoint, AvailabilityPolicy, ClusterConfiguration, Condition, DNSSpec, EtcdSpec,
    ImageContentSource, LocalObjectReference, PlatformSpec, SecretKeyReference,
    ServicePublishingStrategyMapping,
};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1alpha1",
    kind = "HostedControlPlane",
    namespaced,
    status = "HostedControlPlaneStatus",
    derive = "Default",
    shortname = "hcp"
)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneSpec {
    /// Release image the control plane should run
    #[serde(default)]
    pub release_image: String,

    #[serde(default)]
    pub pull_secret: LocalObjectReference,

    #[serde(rename = "issuerURL", default)]
    pub issuer_url: String,

    #[serde(rename = "serviceCIDR", default)]
    pub service_cidr: String,

    #[serde(rename = "podCIDR", default)]
    pub pod_cidr: String,

    #[serde(rename = "machineCIDR", default)]
    pub machine_cidr: String,

    #[serde(default)]
    pub network_type: String,

    #[serde(rename = "sshKey", default)]
    pub ssh_key: LocalObjectReference,

    #[serde(rename = "infraID", default)]
    pub infra_id: String,

    #[serde(default)]
    pub platform: PlatformSpec,

    #[serde(default)]
    pub dns: DNSSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_advertise_address: Option<String>,

    #[serde(default)]
    pub controller_availability_policy: AvailabilityPolicy,

    #[serde(default)]
    pub fips: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_webhook: Option<LocalObjectReference>,

    #[serde(default)]
    pub etcd: EtcdSpec,

    #[serde(default)]
    pub services: Vec<ServicePublishingStrategyMapping>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_content_sources: Vec<ImageContentSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ClusterConfiguration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneStatus {
    /// Control plane is fully operational
    #[serde(default)]
    pub ready: bool,

    /// Endpoint the API server is reachable at
    #[serde(default)]
    pub control_plane_endpoint: APIEndpoint,

    /// Version reported by the deployed release
    #[serde(default)]
    pub version: String,

    /// Release image actually rolled out
    #[serde(default)]
    pub release_image: String,

    /// When `release_image` last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release_image_transition_time: Option<DateTime<Utc>>,

    /// Admin kubeconfig secret in the control plane namespace
    #[serde(rename = "kubeConfig", default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<SecretKeyReference>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}
