//! Cluster API records
//!
//! The subset of Cluster API types the controller creates: the linking
//! `Cluster` and the infrastructure cluster kinds. Once created these are
//! handed off to the Cluster API controllers, so only the fields written at
//! creation are modelled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::TypedObjectReference;

/// Host/port pair of an API endpoint
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct APIEndpoint {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: i32,
}

impl APIEndpoint {
    /// True once a host has been assigned
    #[must_use]
    pub fn is_set(&self) -> bool {
        !self.host.is_empty()
    }
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1alpha4",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub control_plane_endpoint: APIEndpoint,

    /// Object providing the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<TypedObjectReference>,

    /// Provider-specific infrastructure object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<TypedObjectReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: String,

    #[serde(default)]
    pub infrastructure_ready: bool,

    #[serde(default)]
    pub control_plane_ready: bool,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha4",
    kind = "AWSCluster",
    namespaced,
    status = "InfraClusterStatus",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct AWSClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default)]
    pub control_plane_endpoint: APIEndpoint,
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha4",
    kind = "IBMCluster",
    namespaced,
    status = "InfraClusterStatus",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct IBMClusterSpec {
    #[serde(default)]
    pub control_plane_endpoint: APIEndpoint,
}

/// Status shared by the externally managed infrastructure kinds
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InfraClusterStatus {
    /// Infrastructure is ready for the control plane
    #[serde(default)]
    pub ready: bool,
}
