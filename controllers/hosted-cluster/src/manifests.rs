//! Names, annotations and default images of everything the controller
//! writes on behalf of a HostedCluster.

use kube::Resource;
use object_store::ObjectKey;

/// Finalizer holding a HostedCluster until teardown completes
pub const FINALIZER: &str = "hypershift.openshift.io/finalizer";

/// Back-reference from a dependent to its HostedCluster (`namespace/name`)
pub const HOSTED_CLUSTER_ANNOTATION: &str = "hypershift.openshift.io/cluster";

/// Marks Cluster API infrastructure as managed outside Cluster API
pub const MANAGED_BY_ANNOTATION: &str = "cluster.x-k8s.io/managed-by";

/// Value of [`MANAGED_BY_ANNOTATION`]
pub const MANAGED_BY_EXTERNAL: &str = "external";

/// HostedCluster annotations understood by the controller
pub mod annotations {
    pub const DISABLE_PKI_RECONCILIATION: &str = "hypershift.openshift.io/disable-pki-reconciliation";
    pub const OAUTH_LOGIN_URL_OVERRIDE: &str = "oauth.hypershift.openshift.io/login-url-override";
    pub const IDENTITY_PROVIDER_OVERRIDES_PREFIX: &str = "idpoverrides.hypershift.openshift.io/";
    pub const KONNECTIVITY_AGENT_IMAGE: &str = "hypershift.openshift.io/konnectivity-agent-image";
    pub const KONNECTIVITY_SERVER_IMAGE: &str = "hypershift.openshift.io/konnectivity-server-image";
    pub const RESTART_DATE: &str = "hypershift.openshift.io/restart-date";

    pub const CAPI_MANAGER_IMAGE: &str = "hypershift.openshift.io/capi-manager-image";
    pub const CLUSTER_AUTOSCALER_IMAGE: &str = "hypershift.openshift.io/cluster-autoscaler-image";
}

/// True for HostedCluster annotations copied onto the HostedControlPlane
pub fn forwarded_annotation(key: &str) -> bool {
    matches!(
        key,
        annotations::DISABLE_PKI_RECONCILIATION
            | annotations::OAUTH_LOGIN_URL_OVERRIDE
            | annotations::KONNECTIVITY_AGENT_IMAGE
            | annotations::KONNECTIVITY_SERVER_IMAGE
            | annotations::RESTART_DATE
    ) || key.starts_with(annotations::IDENTITY_PROVIDER_OVERRIDES_PREFIX)
}

/// Default component images
pub mod images {
    pub const CLUSTER_AUTOSCALER: &str = "k8s.gcr.io/autoscaling/cluster-autoscaler:v1.21.0";
    pub const CLUSTER_API: &str = "k8s.gcr.io/cluster-api/cluster-api-controller:v0.4.0-beta.0";
    pub const CAPI_AWS_PROVIDER: &str = "gcr.io/k8s-staging-cluster-api-aws/cluster-api-aws-controller@sha256:56f8925ad141a545f9db1e8c2d4bb2f33d99145abe80e6950a134b490c82ae4b";
}

/// Secret names inside the control plane namespace
pub mod secrets {
    pub const CLOUD_CONTROLLER_CREDS: &str = "cloud-controller-creds";
    pub const NODE_MANAGEMENT_CREDS: &str = "node-management-creds";
    pub const PULL_SECRET: &str = "pull-secret";
    pub const SIGNING_KEY: &str = "signing-key";
    pub const SSH_KEY: &str = "ssh-key";
    pub const CAPI_WEBHOOKS_TLS: &str = "capi-webhooks-tls";
    pub const IGNITION_CA: &str = "ignition-server-ca-cert";
    pub const IGNITION_SERVING_CERT: &str = "ignition-server-serving-cert";
}

/// Secret data keys
pub mod keys {
    pub const AWS_CREDENTIALS: &str = "credentials";
    pub const DOCKER_CONFIG_JSON: &str = ".dockerconfigjson";
    pub const AUDIT_WEBHOOK_KUBECONFIG: &str = "webhook-kubeconfig";
    pub const SIGNING_KEY: &str = "key";
    pub const SSH_PUBLIC_KEY: &str = "id_rsa.pub";
    pub const KUBECONFIG: &str = "kubeconfig";
    pub const CAPI_KUBECONFIG: &str = "value";
    pub const TLS_CERT: &str = "tls.crt";
    pub const TLS_KEY: &str = "tls.key";
    pub const ETCD_CLIENT_CERT: &str = "etcd-client.crt";
    pub const ETCD_CLIENT_KEY: &str = "etcd-client.key";
    pub const ETCD_CLIENT_CA: &str = "etcd-client-ca.crt";
}

/// Namespace holding one cluster's control plane
pub fn control_plane_namespace(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}").replace('.', "-")
}

/// Admin kubeconfig secret published next to the HostedCluster
pub fn kubeconfig_secret_name(cluster_name: &str) -> String {
    format!("{cluster_name}-admin-kubeconfig")
}

/// Kubeconfig Cluster API writes for the guest cluster
pub fn capi_kubeconfig_secret_name(infra_id: &str) -> String {
    format!("{infra_id}-kubeconfig")
}

/// Key of a namespaced dependent in the control plane namespace
pub fn in_namespace(namespace: &str, name: &str) -> ObjectKey {
    ObjectKey::namespaced(namespace, name)
}

/// Set the HostedCluster back-reference annotation on a dependent
pub fn annotate_owner<K: Resource>(obj: &mut K, owner: &ObjectKey) {
    obj.meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(HOSTED_CLUSTER_ANNOTATION.to_string(), owner.to_string());
}

/// HostedCluster key recorded on a dependent, if any
pub fn owner_of<K: Resource>(obj: &K) -> Option<ObjectKey> {
    let value = obj.meta().annotations.as_ref()?.get(HOSTED_CLUSTER_ANNOTATION)?;
    ObjectKey::parse(value).filter(|key| key.namespace.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;

    #[test]
    fn test_control_plane_namespace() {
        assert_eq!(control_plane_namespace("clusters", "demo"), "clusters-demo");
        assert_eq!(control_plane_namespace("clusters", "demo.v2"), "clusters-demo-v2");
    }

    #[test]
    fn test_forwarded_annotations() {
        assert!(forwarded_annotation(annotations::RESTART_DATE));
        assert!(forwarded_annotation("idpoverrides.hypershift.openshift.io/github"));
        assert!(!forwarded_annotation("example.com/unrelated"));
        assert!(!forwarded_annotation(annotations::CAPI_MANAGER_IMAGE));
    }

    #[test]
    fn test_owner_round_trip() {
        let mut secret = Secret::default();
        let owner = ObjectKey::namespaced("clusters", "demo");
        annotate_owner(&mut secret, &owner);

        assert_eq!(owner_of(&secret), Some(owner));
    }

    #[test]
    fn test_owner_requires_namespace() {
        let mut secret = Secret::default();
        secret.metadata.annotations = Some([(HOSTED_CLUSTER_ANNOTATION.to_string(), "demo".to_string())].into());
        assert_eq!(owner_of(&secret), None);
    }
}
