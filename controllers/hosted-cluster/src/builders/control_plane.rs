//! HostedControlPlane and Cluster API records

use std::collections::BTreeMap;

use crds::{
    APIEndpoint, AWSCluster, Cluster, EtcdManagementType, HostedCluster, HostedControlPlane,
    IBMCluster, InfraClusterStatus, LocalObjectReference, PlatformSpec, TypedObjectReference,
    specified_name,
};
use object_store::ObjectKey;

use crate::error::ControllerError;
use crate::manifests::{
    HOSTED_CLUSTER_ANNOTATION, MANAGED_BY_ANNOTATION, MANAGED_BY_EXTERNAL, forwarded_annotation, secrets,
};

pub(super) fn hosted_control_plane(
    hcp: &mut HostedControlPlane,
    hc: &HostedCluster,
    platform: &PlatformSpec,
) -> Result<(), ControllerError> {
    let owner = ObjectKey::from_resource(hc)
        .ok_or_else(|| ControllerError::Build("HostedControlPlane for an unnamed HostedCluster".to_string()))?;

    // new control planes start at the requested release; afterwards the
    // release only moves once the previous rollout has completed
    if hcp.metadata.creation_timestamp.is_none() {
        hcp.spec.release_image.clone_from(&hc.spec.release.image);
    }

    let mut annotations = BTreeMap::from([(HOSTED_CLUSTER_ANNOTATION.to_string(), owner.to_string())]);
    for (key, value) in hc.metadata.annotations.iter().flatten() {
        if forwarded_annotation(key) {
            annotations.insert(key.clone(), value.clone());
        }
    }
    hcp.metadata.annotations = Some(annotations);

    let spec = &mut hcp.spec;
    spec.pull_secret = LocalObjectReference::new(secrets::PULL_SECRET);
    if specified_name(hc.spec.signing_key.as_ref()).is_some() {
        spec.signing_key = Some(LocalObjectReference::new(secrets::SIGNING_KEY));
    }
    if hc.spec.ssh_key.specified().is_some() {
        spec.ssh_key = LocalObjectReference::new(secrets::SSH_KEY);
    }
    if let Some(name) = specified_name(hc.spec.audit_webhook.as_ref()) {
        spec.audit_webhook = Some(LocalObjectReference::new(name));
    }

    spec.fips = hc.spec.fips;
    spec.issuer_url.clone_from(&hc.spec.issuer_url);
    spec.service_cidr.clone_from(&hc.spec.networking.service_cidr);
    spec.pod_cidr.clone_from(&hc.spec.networking.pod_cidr);
    spec.machine_cidr.clone_from(&hc.spec.networking.machine_cidr);
    spec.network_type.clone_from(&hc.spec.networking.network_type);
    if let Some(api_server) = &hc.spec.networking.api_server {
        spec.api_advertise_address.clone_from(&api_server.advertise_address);
        spec.api_port = api_server.port;
    }
    spec.infra_id.clone_from(&hc.spec.infra_id);
    spec.dns = hc.spec.dns.clone();
    spec.services = hc.spec.services.clone();
    spec.controller_availability_policy = hc.spec.controller_availability_policy;

    spec.etcd.management_type = hc.spec.etcd.management_type;
    match hc.spec.etcd.management_type {
        EtcdManagementType::Unmanaged => spec.etcd.unmanaged = hc.spec.etcd.unmanaged.clone(),
        EtcdManagementType::Managed => spec.etcd.managed = hc.spec.etcd.managed.clone(),
    }

    spec.image_content_sources = hc.spec.image_content_sources.clone();
    spec.platform = platform.clone();

    let rollout_settled = hc
        .status
        .as_ref()
        .and_then(|s| s.version.as_ref())
        .is_some_and(crds::ClusterVersionStatus::head_completed);
    if rollout_settled {
        spec.release_image.clone_from(&hc.spec.release.image);
    }

    spec.configuration = hc.spec.configuration.clone();
    Ok(())
}

/// Set only on creation; Cluster API owns the object afterwards
pub(super) fn capi_cluster(
    cluster: &mut Cluster,
    control_plane: &TypedObjectReference,
    infrastructure: &TypedObjectReference,
) {
    if cluster.metadata.creation_timestamp.is_some() {
        return;
    }
    cluster.spec.control_plane_ref = Some(control_plane.clone());
    cluster.spec.infrastructure_ref = Some(infrastructure.clone());
}

fn mark_externally_managed(annotations: &mut Option<BTreeMap<String, String>>) {
    annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(MANAGED_BY_ANNOTATION.to_string(), MANAGED_BY_EXTERNAL.to_string());
}

pub(super) fn aws_cluster(infra: &mut AWSCluster, hc: &HostedCluster, endpoint: &APIEndpoint) {
    mark_externally_managed(&mut infra.metadata.annotations);
    if let Some(aws) = &hc.spec.platform.aws {
        infra.spec.region = Some(aws.region.clone());
    }
    infra.spec.control_plane_endpoint = endpoint.clone();
    infra.status = Some(InfraClusterStatus { ready: true });
}

pub(super) fn ibm_cluster(infra: &mut IBMCluster, endpoint: &APIEndpoint) {
    mark_externally_managed(&mut infra.metadata.annotations);
    infra.spec.control_plane_endpoint = endpoint.clone();
    infra.status = Some(InfraClusterStatus { ready: true });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifests::annotations;
    use crds::{ClusterVersionStatus, HostedClusterStatus, Release, UpdateHistory, UpdateState};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn created() -> Option<Time> {
        Some(serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap())
    }

    fn cluster(image: &str) -> HostedCluster {
        let mut hc = HostedCluster::new("demo", Default::default());
        hc.metadata.namespace = Some("clusters".to_string());
        hc.spec.release = Release::new(image);
        hc.spec.infra_id = "demo-abcde".to_string();
        hc
    }

    fn with_history(mut hc: HostedCluster, state: UpdateState) -> HostedCluster {
        hc.status = Some(HostedClusterStatus {
            version: Some(ClusterVersionStatus {
                desired: Release::new("v1"),
                history: vec![UpdateHistory {
                    state,
                    image: "v1".to_string(),
                    ..Default::default()
                }],
                observed_generation: 1,
            }),
            ..Default::default()
        });
        hc
    }

    fn existing_hcp(image: &str) -> HostedControlPlane {
        let mut hcp = HostedControlPlane::default();
        hcp.metadata.creation_timestamp = created();
        hcp.spec.release_image = image.to_string();
        hcp
    }

    #[test]
    fn test_new_control_plane_gets_requested_release() {
        let mut hcp = HostedControlPlane::default();
        hosted_control_plane(&mut hcp, &cluster("v1"), &PlatformSpec::default()).unwrap();
        assert_eq!(hcp.spec.release_image, "v1");
        assert_eq!(hcp.spec.pull_secret.name, secrets::PULL_SECRET);
        assert_eq!(hcp.spec.infra_id, "demo-abcde");
    }

    #[test]
    fn test_release_held_while_rollout_partial() {
        let hc = with_history(cluster("v2"), UpdateState::Partial);
        let mut hcp = existing_hcp("v1");
        hosted_control_plane(&mut hcp, &hc, &PlatformSpec::default()).unwrap();
        assert_eq!(hcp.spec.release_image, "v1");
    }

    #[test]
    fn test_release_advances_after_completion() {
        let hc = with_history(cluster("v2"), UpdateState::Completed);
        let mut hcp = existing_hcp("v1");
        hosted_control_plane(&mut hcp, &hc, &PlatformSpec::default()).unwrap();
        assert_eq!(hcp.spec.release_image, "v2");
    }

    #[test]
    fn test_annotation_allow_list() {
        let mut hc = cluster("v1");
        hc.metadata.annotations = Some(
            [
                (annotations::RESTART_DATE, "2026-01-01"),
                ("idpoverrides.hypershift.openshift.io/github", "{}"),
                (annotations::CLUSTER_AUTOSCALER_IMAGE, "autoscaler:dev"),
                ("example.com/team", "infra"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        );
        let mut hcp = HostedControlPlane::default();
        hcp.metadata.annotations = Some([("stale".to_string(), "x".to_string())].into());

        hosted_control_plane(&mut hcp, &hc, &PlatformSpec::default()).unwrap();

        let annotations = hcp.metadata.annotations.unwrap();
        let keys: Vec<&str> = annotations.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                HOSTED_CLUSTER_ANNOTATION,
                annotations::RESTART_DATE,
                "idpoverrides.hypershift.openshift.io/github",
            ]
        );
        assert_eq!(annotations[HOSTED_CLUSTER_ANNOTATION], "clusters/demo");
    }

    #[test]
    fn test_cluster_refs_only_set_on_create() {
        let hcp_ref = TypedObjectReference::for_resource::<HostedControlPlane>("clusters-demo", "demo");
        let infra_ref = TypedObjectReference::for_resource::<AWSCluster>("clusters-demo", "demo");

        let mut fresh = Cluster::default();
        capi_cluster(&mut fresh, &hcp_ref, &infra_ref);
        assert_eq!(fresh.spec.infrastructure_ref.as_ref().map(|r| r.kind.as_str()), Some("AWSCluster"));
        assert_eq!(fresh.spec.control_plane_ref, Some(hcp_ref.clone()));

        let mut existing = Cluster::default();
        existing.metadata.creation_timestamp = created();
        capi_cluster(&mut existing, &hcp_ref, &infra_ref);
        assert!(existing.spec.infrastructure_ref.is_none());
    }

    #[test]
    fn test_infra_keeps_foreign_annotations() {
        let mut infra = AWSCluster::default();
        infra.metadata.annotations = Some([("capa".to_string(), "owned".to_string())].into());
        let endpoint = APIEndpoint {
            host: "api.demo.example.com".to_string(),
            port: 6443,
        };

        aws_cluster(&mut infra, &cluster("v1"), &endpoint);

        let annotations = infra.metadata.annotations.unwrap();
        assert_eq!(annotations["capa"], "owned");
        assert_eq!(annotations[MANAGED_BY_ANNOTATION], MANAGED_BY_EXTERNAL);
        assert_eq!(infra.spec.control_plane_endpoint, endpoint);
        assert_eq!(infra.status, Some(InfraClusterStatus { ready: true }));
    }
}
