//! NodePool CRD
//!
//! Worker capacity attached to a HostedCluster. The hosted-cluster controller
//! only lists and deletes these during teardown.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Release;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1alpha1",
    kind = "NodePool",
    namespaced,
    status = "NodePoolStatus",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Name of the HostedCluster (in the same namespace) this pool belongs to
    pub cluster_name: String,

    /// Desired number of nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<i32>,

    /// Release for the pool's nodes
    #[serde(default)]
    pub release: Release,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatus {
    /// Number of ready nodes
    #[serde(default)]
    pub node_count: i32,
}
