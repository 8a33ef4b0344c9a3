//! HostedCluster CRD
//!
//! User-authored description of one hosted cluster. The controller derives a
//! HostedControlPlane and its supporting resources in a dedicated
//! control-plane namespace and reports aggregated health and rollout state
//! back into `status`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ClusterVersionStatus, Condition, LocalObjectReference, Release};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1alpha1",
    kind = "HostedCluster",
    namespaced,
    status = "HostedClusterStatus",
    derive = "Default",
    shortname = "hc"
)]
#[serde(rename_all = "camelCase")]
pub struct HostedClusterSpec {
    /// Release to run the control plane at
    pub release: Release,

    /// Infrastructure identifier, used to name provider resources
    #[serde(rename = "infraID", default)]
    pub infra_id: String,

    /// Target platform and its settings
    #[serde(default)]
    pub platform: PlatformSpec,

    /// Pull secret (must carry `.dockerconfigjson`)
    #[serde(default)]
    pub pull_secret: LocalObjectReference,

    /// Optional audit webhook kubeconfig secret (`webhook-kubeconfig` key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_webhook: Option<LocalObjectReference>,

    /// Optional service account signing key secret (`key` key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<LocalObjectReference>,

    /// SSH public key secret (`id_rsa.pub` key)
    #[serde(rename = "sshKey", default)]
    pub ssh_key: LocalObjectReference,

    /// Run with FIPS-validated crypto
    #[serde(default)]
    pub fips: bool,

    /// OIDC issuer URL
    #[serde(rename = "issuerURL", default)]
    pub issuer_url: String,

    /// Cluster networking
    #[serde(default)]
    pub networking: ClusterNetworking,

    /// Autoscaling options forwarded to the cluster autoscaler
    #[serde(default)]
    pub autoscaling: ClusterAutoscaling,

    /// DNS configuration
    #[serde(default)]
    pub dns: DNSSpec,

    /// How each control plane service is exposed
    #[serde(default)]
    pub services: Vec<ServicePublishingStrategyMapping>,

    /// Replica policy for control plane components
    #[serde(default)]
    pub controller_availability_policy: AvailabilityPolicy,

    /// Etcd management
    #[serde(default)]
    pub etcd: EtcdSpec,

    /// Image mirrors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_content_sources: Vec<ImageContentSource>,

    /// Global configuration references copied into the control plane namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ClusterConfiguration>,
}

/// Supported platforms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
pub enum PlatformType {
    /// Amazon Web Services
    #[serde(rename = "AWS")]
    Aws,
    /// No provider integration
    #[default]
    None,
    /// IBM Cloud
    #[serde(rename = "IBMCloud")]
    IbmCloud,
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformType::Aws => write!(f, "AWS"),
            PlatformType::None => write!(f, "None"),
            PlatformType::IbmCloud => write!(f, "IBMCloud"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpec {
    /// Platform type
    #[serde(rename = "type", default)]
    pub r#type: PlatformType,

    /// AWS settings, required when type is AWS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AWSPlatformSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AWSPlatformSpec {
    /// AWS region
    pub region: String,

    /// Tags applied to provider resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_tags: Vec<AWSResourceTag>,

    /// Secret with `credentials` for the cloud controller
    #[serde(default)]
    pub kube_cloud_controller_creds: LocalObjectReference,

    /// Secret with `credentials` for node pool management
    #[serde(default)]
    pub node_pool_management_creds: LocalObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct AWSResourceTag {
    /// Tag key
    pub key: String,
    /// Tag value
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworking {
    #[serde(rename = "serviceCIDR", default)]
    pub service_cidr: String,

    #[serde(rename = "podCIDR", default)]
    pub pod_cidr: String,

    #[serde(rename = "machineCIDR", default)]
    pub machine_cidr: String,

    /// CNI plugin (e.g., "OpenShiftSDN", "OVNKubernetes")
    #[serde(default)]
    pub network_type: String,

    /// API server advertise settings
    #[serde(rename = "apiServer", default, skip_serializing_if = "Option::is_none")]
    pub api_server: Option<APIServerNetworking>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct APIServerNetworking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAutoscaling {
    /// Maximum number of nodes across all node groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nodes_total: Option<i32>,

    /// Seconds to wait for graceful pod termination on scale down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pod_grace_period: Option<i32>,

    /// Maximum time to wait for a node to be provisioned (duration string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_node_provision_time: Option<String>,

    /// Pods below this priority do not trigger scale up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_priority_threshold: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DNSSpec {
    #[serde(default)]
    pub base_domain: String,

    #[serde(rename = "publicZoneID", default, skip_serializing_if = "String::is_empty")]
    pub public_zone_id: String,

    #[serde(rename = "privateZoneID", default, skip_serializing_if = "String::is_empty")]
    pub private_zone_id: String,
}

/// Logical control plane services with a publishing strategy
pub mod services {
    pub const API_SERVER: &str = "APIServer";
    pub const OAUTH_SERVER: &str = "OAuthServer";
    pub const KONNECTIVITY: &str = "Konnectivity";
    pub const OIDC: &str = "OIDC";
    pub const IGNITION: &str = "Ignition";
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServicePublishingStrategyMapping {
    /// Logical service name (see [`services`])
    pub service: String,

    /// How the service is exposed
    pub service_publishing_strategy: ServicePublishingStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServicePublishingStrategy {
    /// Strategy name: LoadBalancer, NodePort, Route or None
    ///
    /// Kept as a free string so that an unrecognised value reaches the
    /// controller and is reported as a configuration error.
    #[serde(rename = "type")]
    pub r#type: String,

    /// NodePort details, required for the NodePort strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<NodePortPublishingStrategy>,
}

/// Parsed publishing strategy type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishingStrategyType {
    LoadBalancer,
    NodePort,
    Route,
    None,
    /// Anything else
    Unknown(String),
}

impl ServicePublishingStrategy {
    /// Parse the strategy type
    #[must_use]
    pub fn strategy_type(&self) -> PublishingStrategyType {
        match self.r#type.as_str() {
            "LoadBalancer" => PublishingStrategyType::LoadBalancer,
            "NodePort" => PublishingStrategyType::NodePort,
            "Route" => PublishingStrategyType::Route,
            "None" => PublishingStrategyType::None,
            other => PublishingStrategyType::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodePortPublishingStrategy {
    /// Externally reachable address of the nodes
    pub address: String,

    /// Fixed node port (allocated by the cluster when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum AvailabilityPolicy {
    HighlyAvailable,
    #[default]
    SingleReplica,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum EtcdManagementType {
    /// Etcd is deployed and operated by the control plane
    #[default]
    Managed,
    /// Etcd is provided externally
    Unmanaged,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    /// Managed or Unmanaged
    #[serde(default)]
    pub management_type: EtcdManagementType,

    /// Settings for managed etcd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<ManagedEtcdSpec>,

    /// Connection details for unmanaged etcd
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmanaged: Option<UnmanagedEtcdSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedEtcdSpec {
    #[serde(default)]
    pub storage: ManagedEtcdStorageSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedEtcdStorageSpec {
    /// Storage type (e.g., "PersistentVolume")
    #[serde(rename = "type", default)]
    pub r#type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume: Option<PersistentVolumeEtcdStorageSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeEtcdStorageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnmanagedEtcdSpec {
    /// Client URL of the external etcd cluster
    #[serde(default)]
    pub endpoint: String,

    /// Client TLS material
    #[serde(default)]
    pub tls: EtcdTLSConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EtcdTLSConfig {
    /// Secret with `etcd-client.crt`, `etcd-client.key` and `etcd-client-ca.crt`
    #[serde(default)]
    pub client_secret: LocalObjectReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageContentSource {
    pub source: String,

    #[serde(default)]
    pub mirrors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfiguration {
    /// ConfigMaps copied into the control plane namespace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_map_refs: Vec<LocalObjectReference>,

    /// Secrets copied into the control plane namespace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_refs: Vec<LocalObjectReference>,
}

/// Observed state of a HostedCluster
///
/// Optional fields serialize as `null` rather than being omitted so that a
/// merge patch of the whole block clears values that are no longer set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostedClusterStatus {
    /// Rollout state
    #[serde(default)]
    pub version: Option<ClusterVersionStatus>,

    /// Admin kubeconfig secret in the HostedCluster's namespace
    #[serde(rename = "kubeconfig", default)]
    pub kubeconfig: Option<LocalObjectReference>,

    /// Address nodes use to fetch ignition
    #[serde(default)]
    pub ignition_endpoint: Option<String>,

    /// Conditions, one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl HostedCluster {
    /// Service publishing strategy for the given logical service
    #[must_use]
    pub fn publishing_strategy(&self, service: &str) -> Option<&ServicePublishingStrategy> {
        self.spec
            .services
            .iter()
            .find(|m| m.service == service)
            .map(|m| &m.service_publishing_strategy)
    }
}
