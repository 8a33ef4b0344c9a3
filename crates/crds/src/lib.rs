//! HostedCluster CRD Definitions
//!
//! Kubernetes resource types consumed and produced by the hosted-cluster
//! controller: the user-facing `HostedCluster`, the per-cluster
//! `HostedControlPlane`, `NodePool`, and the Cluster API records the
//! controller hands off to external orchestrators.

pub mod cluster_api;
pub mod conditions;
pub mod hosted_cluster;
pub mod hosted_control_plane;
pub mod node_pool;
pub mod references;
pub mod route;
pub mod version;

pub use cluster_api::*;
pub use conditions::*;
pub use hosted_cluster::*;
pub use hosted_control_plane::*;
pub use node_pool::*;
pub use references::*;
pub use route::*;
pub use version::*;

/// API group shared by HostedCluster, HostedControlPlane and NodePool.
pub const HYPERSHIFT_GROUP: &str = "hypershift.openshift.io";

/// API version shared by HostedCluster, HostedControlPlane and NodePool.
pub const HYPERSHIFT_VERSION: &str = "v1alpha1";
