//! Test utilities for unit testing the reconciler
//!
//! Fixtures for a HostedCluster `clusters/demo` published over NodePort, the
//! secrets it references, and a reconciler over [`MockStore`] with a fixed
//! clock.

use std::sync::Arc;
use std::time::Duration;

use crds::*;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use object_store::{MockStore, ObjectKey};

use crate::clock::FakeClock;
use crate::config::ComponentImages;
use crate::manifests::{self, keys};
use crate::reconciler::{Reconciler, ReconcilerSettings};

pub const NAMESPACE: &str = "clusters";
pub const NAME: &str = "demo";
pub const CP_NAMESPACE: &str = "clusters-demo";
pub const INFRA_ID: &str = "demo-x7k2p";
pub const RELEASE_V1: &str = "quay.io/openshift-release-dev/ocp-release:4.8.0-x86_64";
pub const RELEASE_V2: &str = "quay.io/openshift-release-dev/ocp-release:4.8.2-x86_64";
pub const PULL_SECRET: &str = "demo-pull-secret";
pub const SSH_KEY: &str = "demo-ssh-key";
pub const IGNITION_ADDRESS: &str = "10.0.0.10";
pub const IGNITION_NODE_PORT: i32 = 30080;

/// Seconds since the epoch the fake clock starts at
pub const START: i64 = 1_790_000_000;

pub fn test_images() -> ComponentImages {
    ComponentImages {
        control_plane_operator: "quay.io/hypershift/hypershift:test".to_string(),
        ignition_server: "quay.io/hypershift/ignition-server:test".to_string(),
        cluster_api: "capi:test".to_string(),
        capi_aws_provider: "capa:test".to_string(),
        cluster_autoscaler: "autoscaler:test".to_string(),
    }
}

pub fn test_settings() -> ReconcilerSettings {
    ReconcilerSettings {
        images: test_images(),
        deletion_requeue: Duration::from_secs(5),
        conflict_requeue: Duration::from_secs(1),
    }
}

/// Reconciler over `store` with a clock the test can advance
pub fn create_test_reconciler(store: &MockStore) -> (Reconciler<MockStore>, Arc<FakeClock>) {
    let clock = Arc::new(FakeClock::at(START));
    let reconciler = Reconciler::new(store.clone(), test_settings()).with_clock(clock.clone());
    (reconciler, clock)
}

pub fn cluster_key() -> ObjectKey {
    ObjectKey::namespaced(NAMESPACE, NAME)
}

pub fn hcp_key() -> ObjectKey {
    ObjectKey::namespaced(CP_NAMESPACE, NAME)
}

/// HostedCluster with the fields every platform needs
pub fn create_test_hosted_cluster(release_image: &str) -> HostedCluster {
    HostedCluster {
        metadata: ObjectMeta {
            name: Some(NAME.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: HostedClusterSpec {
            release: Release::new(release_image),
            infra_id: INFRA_ID.to_string(),
            pull_secret: LocalObjectReference::new(PULL_SECRET),
            ssh_key: LocalObjectReference::new(SSH_KEY),
            issuer_url: "https://oidc.example.com".to_string(),
            networking: ClusterNetworking {
                service_cidr: "172.31.0.0/16".to_string(),
                pod_cidr: "10.132.0.0/14".to_string(),
                machine_cidr: "10.0.0.0/16".to_string(),
                network_type: "OpenShiftSDN".to_string(),
                ..Default::default()
            },
            services: vec![ServicePublishingStrategyMapping {
                service: services::IGNITION.to_string(),
                service_publishing_strategy: ServicePublishingStrategy {
                    r#type: "NodePort".to_string(),
                    node_port: Some(NodePortPublishingStrategy {
                        address: IGNITION_ADDRESS.to_string(),
                        port: Some(IGNITION_NODE_PORT),
                    }),
                },
            }],
            ..Default::default()
        },
        status: None,
    }
}

/// Secret with string data
pub fn create_test_secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Store `hc` together with the pull and ssh secrets it references
pub fn seed_hosted_cluster(store: &MockStore, hc: &HostedCluster) -> HostedCluster {
    store.insert(&create_test_secret(
        NAMESPACE,
        PULL_SECRET,
        &[(keys::DOCKER_CONFIG_JSON, r#"{"auths":{}}"#)],
    ));
    store.insert(&create_test_secret(
        NAMESPACE,
        SSH_KEY,
        &[(keys::SSH_PUBLIC_KEY, "ssh-rsa AAAA demo")],
    ));
    store.insert(hc)
}

/// Fresh copy of the stored HostedCluster
pub fn stored_hosted_cluster(store: &MockStore) -> HostedCluster {
    store
        .peek::<HostedCluster>(&cluster_key())
        .expect("HostedCluster should be stored")
}

/// Control plane status as the control plane operator would report it
pub fn settled_control_plane_status(release_image: &str, version: &str) -> HostedControlPlaneStatus {
    HostedControlPlaneStatus {
        ready: true,
        control_plane_endpoint: APIEndpoint {
            host: "api.demo.example.com".to_string(),
            port: 6443,
        },
        version: version.to_string(),
        release_image: release_image.to_string(),
        last_release_image_transition_time: None,
        kube_config: Some(SecretKeyReference {
            name: "admin-kubeconfig".to_string(),
            key: keys::KUBECONFIG.to_string(),
        }),
        conditions: vec![
            Condition::new(
                conditions::types::HOSTED_CONTROL_PLANE_AVAILABLE,
                ConditionStatus::True,
                "AsExpected",
            ),
        ],
    }
}

/// Overwrite the stored HostedControlPlane status
pub fn set_control_plane_status(store: &MockStore, status: HostedControlPlaneStatus) -> HostedControlPlane {
    let mut hcp = store
        .peek::<HostedControlPlane>(&hcp_key())
        .expect("HostedControlPlane should be stored");
    hcp.status = Some(status);
    store.insert(&hcp)
}

/// Stand in for the control plane operator and Cluster API: report a
/// settled control plane and write the kubeconfigs it would produce
pub fn simulate_control_plane(store: &MockStore, release_image: &str, version: &str) {
    set_control_plane_status(store, settled_control_plane_status(release_image, version));
    store.insert(&create_test_secret(
        CP_NAMESPACE,
        "admin-kubeconfig",
        &[(keys::KUBECONFIG, "apiVersion: v1\nkind: Config\n")],
    ));
    store.insert(&create_test_secret(
        CP_NAMESPACE,
        &manifests::capi_kubeconfig_secret_name(INFRA_ID),
        &[(keys::CAPI_KUBECONFIG, "apiVersion: v1\nkind: Config\n")],
    ));
}

/// Condition of the given type on the stored HostedCluster
pub fn condition(hc: &HostedCluster, r#type: &str) -> Option<Condition> {
    hc.status
        .as_ref()
        .and_then(|s| find_status_condition(&s.conditions, r#type))
        .cloned()
}
