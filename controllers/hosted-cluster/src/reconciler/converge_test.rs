//! Unit tests for the converge pass

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crds::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use object_store::{MockStore, ObjectKey, Verb};

    use crate::builders::{DOCKER_CONFIG_JSON_TYPE, ResourceBuilders};
    use crate::error::{ControllerError, ErrorClass};
    use crate::manifests::{
        HOSTED_CLUSTER_ANNOTATION, MANAGED_BY_ANNOTATION, MANAGED_BY_EXTERNAL, annotations, keys, owner_of,
        secrets,
    };
    use crate::reconciler::converge::CONTROL_PLANE_NAMESPACE_LABEL;
    use crate::test_utils::*;

    fn cp(name: &str) -> ObjectKey {
        ObjectKey::namespaced(CP_NAMESPACE, name)
    }

    fn config_map(namespace: &str, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("ca-bundle.crt".to_string(), name.to_string())])),
            ..Default::default()
        }
    }

    fn secret_data(secret: &Secret, key: &str) -> Vec<u8> {
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|b| b.0.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_converge_fresh_cluster() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));

        reconciler.converge(&hc).await.unwrap();

        let namespace = store.peek::<Namespace>(&ObjectKey::cluster(CP_NAMESPACE)).unwrap();
        assert_eq!(namespace.metadata.labels.unwrap()[CONTROL_PLANE_NAMESPACE_LABEL], "true");

        let pull = store.peek::<Secret>(&cp(secrets::PULL_SECRET)).unwrap();
        assert_eq!(pull.type_.as_deref(), Some(DOCKER_CONFIG_JSON_TYPE));
        assert_eq!(secret_data(&pull, keys::DOCKER_CONFIG_JSON), br#"{"auths":{}}"#.to_vec());
        let ssh = store.peek::<Secret>(&cp(secrets::SSH_KEY)).unwrap();
        assert_eq!(secret_data(&ssh, keys::SSH_PUBLIC_KEY), b"ssh-rsa AAAA demo".to_vec());

        let hcp = store.peek::<HostedControlPlane>(&hcp_key()).unwrap();
        assert_eq!(hcp.spec.release_image, RELEASE_V1);
        assert_eq!(hcp.spec.pull_secret.name, secrets::PULL_SECRET);
        assert_eq!(hcp.spec.ssh_key.name, secrets::SSH_KEY);
        assert_eq!(hcp.spec.infra_id, INFRA_ID);
        assert_eq!(hcp.spec.service_cidr, "172.31.0.0/16");
        assert_eq!(hcp.spec.services, hc.spec.services);

        // no control plane endpoint yet
        assert!(store.all::<AWSCluster>().is_empty());
        assert!(store.all::<Cluster>().is_empty());

        for name in ["cluster-api", "control-plane-operator", "ignition-server"] {
            assert!(store.peek::<Deployment>(&cp(name)).is_some(), "deployment {name}");
        }
        assert!(store.peek::<Deployment>(&cp("cluster-autoscaler")).is_none());
        assert!(store.peek::<Secret>(&cp(secrets::IGNITION_SERVING_CERT)).is_some());
        assert!(store.peek::<Secret>(&cp(secrets::CAPI_WEBHOOKS_TLS)).is_some());
    }

    #[tokio::test]
    async fn test_dependents_point_back_at_cluster() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));

        reconciler.converge(&hc).await.unwrap();

        let secrets: Vec<Secret> = store
            .all::<Secret>()
            .into_iter()
            .filter(|s| s.metadata.namespace.as_deref() == Some(CP_NAMESPACE))
            .collect();
        assert!(!secrets.is_empty());
        for secret in secrets.iter() {
            assert_eq!(owner_of(secret), Some(cluster_key()), "{:?}", secret.metadata.name);
        }
        for deployment in store.all::<Deployment>() {
            assert_eq!(owner_of(&deployment), Some(cluster_key()));
        }
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));

        reconciler.converge(&hc).await.unwrap();
        simulate_control_plane(&store, RELEASE_V1, "4.8.0");
        reconciler.converge(&hc).await.unwrap();
        assert!(store.peek::<Deployment>(&cp("cluster-autoscaler")).is_some());

        store.clear_actions();
        reconciler.converge(&hc).await.unwrap();
        assert_eq!(store.write_count(), 0, "unexpected writes: {:?}", store.actions());
    }

    #[tokio::test]
    async fn test_forwarded_annotations_and_image_overrides() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let mut hc = create_test_hosted_cluster(RELEASE_V1);
        hc.metadata.annotations = Some(BTreeMap::from([
            (annotations::RESTART_DATE.to_string(), "2026-10-01".to_string()),
            ("idpoverrides.hypershift.openshift.io/github".to_string(), "{}".to_string()),
            (annotations::CAPI_MANAGER_IMAGE.to_string(), "capi:override".to_string()),
            ("example.com/team".to_string(), "infra".to_string()),
        ]));
        let hc = seed_hosted_cluster(&store, &hc);

        reconciler.converge(&hc).await.unwrap();

        let hcp = store.peek::<HostedControlPlane>(&hcp_key()).unwrap();
        let hcp_annotations = hcp.metadata.annotations.unwrap();
        assert_eq!(hcp_annotations[HOSTED_CLUSTER_ANNOTATION], "clusters/demo");
        assert_eq!(hcp_annotations[annotations::RESTART_DATE], "2026-10-01");
        assert!(hcp_annotations.contains_key("idpoverrides.hypershift.openshift.io/github"));
        assert!(!hcp_annotations.contains_key("example.com/team"));
        assert!(!hcp_annotations.contains_key(annotations::CAPI_MANAGER_IMAGE));

        let capi = store.peek::<Deployment>(&cp("cluster-api")).unwrap();
        let pod = capi.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("capi:override"));

        let cpo = store.peek::<Deployment>(&cp("control-plane-operator")).unwrap();
        let template_annotations = cpo.spec.unwrap().template.metadata.unwrap().annotations.unwrap();
        assert_eq!(template_annotations[annotations::RESTART_DATE], "2026-10-01");
    }

    #[tokio::test]
    async fn test_global_config_fan_out_stops_at_first_missing() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let mut hc = create_test_hosted_cluster(RELEASE_V1);
        hc.spec.configuration = Some(ClusterConfiguration {
            config_map_refs: vec![
                LocalObjectReference::new("proxy-ca"),
                LocalObjectReference::new("oauth-template"),
                LocalObjectReference::new("registry-ca"),
            ],
            secret_refs: vec![LocalObjectReference::new("htpasswd")],
        });
        let hc = seed_hosted_cluster(&store, &hc);
        store.insert(&config_map(NAMESPACE, "proxy-ca"));
        store.insert(&config_map(NAMESPACE, "registry-ca"));
        store.insert(&create_test_secret(NAMESPACE, "htpasswd", &[("htpasswd", "user:hash")]));

        let err = reconciler.converge(&hc).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.to_string().contains("oauth-template"), "{err}");
        assert!(store.peek::<ConfigMap>(&cp("proxy-ca")).is_some());
        assert!(store.peek::<ConfigMap>(&cp("registry-ca")).is_none());
        assert!(store.peek::<Secret>(&cp("htpasswd")).is_none());
        assert!(store.peek::<HostedControlPlane>(&hcp_key()).is_none());

        store.insert(&config_map(NAMESPACE, "oauth-template"));
        reconciler.converge(&hc).await.unwrap();
        let mirrored = store.peek::<ConfigMap>(&cp("registry-ca")).unwrap();
        assert_eq!(mirrored.data.unwrap()["ca-bundle.crt"], "registry-ca");
        let htpasswd = store.peek::<Secret>(&cp("htpasswd")).unwrap();
        assert_eq!(secret_data(&htpasswd, "htpasswd"), b"user:hash".to_vec());
    }

    #[tokio::test]
    async fn test_certificates_are_generated_once() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));

        reconciler.converge(&hc).await.unwrap();
        let ca = store.peek::<Secret>(&cp(secrets::IGNITION_CA)).unwrap();
        let serving = store.peek::<Secret>(&cp(secrets::IGNITION_SERVING_CERT)).unwrap();
        let webhooks = store.peek::<Secret>(&cp(secrets::CAPI_WEBHOOKS_TLS)).unwrap();
        let ca_pem = String::from_utf8(secret_data(&ca, keys::TLS_CERT)).unwrap();
        assert!(ca_pem.starts_with("-----BEGIN CERTIFICATE-----"));

        reconciler.converge(&hc).await.unwrap();
        assert_eq!(store.peek::<Secret>(&cp(secrets::IGNITION_CA)).unwrap().data, ca.data);
        assert_eq!(store.peek::<Secret>(&cp(secrets::IGNITION_SERVING_CERT)).unwrap().data, serving.data);
        assert_eq!(store.peek::<Secret>(&cp(secrets::CAPI_WEBHOOKS_TLS)).unwrap().data, webhooks.data);
    }

    #[tokio::test]
    async fn test_route_without_host_defers_ignition_certificates() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let mut hc = create_test_hosted_cluster(RELEASE_V1);
        hc.spec.services[0].service_publishing_strategy = ServicePublishingStrategy {
            r#type: "Route".to_string(),
            node_port: None,
        };
        let hc = seed_hosted_cluster(&store, &hc);

        reconciler.converge(&hc).await.unwrap();

        let route = store.peek::<Route>(&cp("ignition-server")).unwrap();
        assert_eq!(route.spec.to.name, "ignition-server");
        assert!(store.peek::<Secret>(&cp(secrets::IGNITION_CA)).is_none());
        assert!(store.peek::<Deployment>(&cp("ignition-server")).is_none());

        let mut admitted = route;
        admitted.spec.host = "ignition.apps.example.com".to_string();
        store.insert(&admitted);
        reconciler.converge(&hc).await.unwrap();
        assert!(store.peek::<Secret>(&cp(secrets::IGNITION_SERVING_CERT)).is_some());
        assert!(store.peek::<Deployment>(&cp("ignition-server")).is_some());
    }

    #[tokio::test]
    async fn test_infrastructure_created_once_endpoint_known() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));

        reconciler.converge(&hc).await.unwrap();
        simulate_control_plane(&store, RELEASE_V1, "4.8.0");
        reconciler.converge(&hc).await.unwrap();

        let infra = store.peek::<AWSCluster>(&cp(NAME)).unwrap();
        assert_eq!(
            infra.metadata.annotations.as_ref().unwrap()[MANAGED_BY_ANNOTATION],
            MANAGED_BY_EXTERNAL
        );
        assert_eq!(infra.spec.control_plane_endpoint.host, "api.demo.example.com");
        assert_eq!(infra.spec.control_plane_endpoint.port, 6443);
        assert!(infra.status.unwrap().ready);

        let cluster = store.peek::<Cluster>(&cp(INFRA_ID)).unwrap();
        let infra_ref = cluster.spec.infrastructure_ref.unwrap();
        assert_eq!(infra_ref.kind, "AWSCluster");
        assert_eq!(infra_ref.name, NAME);
        let cp_ref = cluster.spec.control_plane_ref.unwrap();
        assert_eq!(cp_ref.kind, "HostedControlPlane");
        assert_eq!(cp_ref.namespace.as_deref(), Some(CP_NAMESPACE));
    }

    #[tokio::test]
    async fn test_handed_off_records_keep_external_changes() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));
        reconciler.converge(&hc).await.unwrap();
        simulate_control_plane(&store, RELEASE_V1, "4.8.0");
        reconciler.converge(&hc).await.unwrap();

        let mut cluster = store.peek::<Cluster>(&cp(INFRA_ID)).unwrap();
        cluster.spec.control_plane_endpoint.host = "api.demo.example.com".to_string();
        store.insert(&cluster);
        let mut infra = store.peek::<AWSCluster>(&cp(NAME)).unwrap();
        infra
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert("cluster.x-k8s.io/paused".to_string(), "true".to_string());
        store.insert(&infra);

        reconciler.converge(&hc).await.unwrap();

        let cluster = store.peek::<Cluster>(&cp(INFRA_ID)).unwrap();
        assert_eq!(cluster.spec.control_plane_endpoint.host, "api.demo.example.com");
        let infra = store.peek::<AWSCluster>(&cp(NAME)).unwrap();
        assert!(infra.metadata.annotations.unwrap().contains_key("cluster.x-k8s.io/paused"));
    }

    #[tokio::test]
    async fn test_capi_cluster_is_not_rewritten() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));
        reconciler.converge(&hc).await.unwrap();
        simulate_control_plane(&store, RELEASE_V1, "4.8.0");
        reconciler.converge(&hc).await.unwrap();

        let mut cluster = store.peek::<Cluster>(&cp(INFRA_ID)).unwrap();
        cluster.metadata.annotations = None;
        store.insert(&cluster);
        store.clear_actions();

        reconciler.converge(&hc).await.unwrap();

        assert!(
            !store.calls(Verb::Update).iter().any(|c| c.starts_with("Cluster ")),
            "{:?}",
            store.actions()
        );
        let cluster = store.peek::<Cluster>(&cp(INFRA_ID)).unwrap();
        assert!(owner_of(&cluster).is_none());
    }

    #[tokio::test]
    async fn test_kubeconfig_published_next_to_cluster() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));
        reconciler.converge(&hc).await.unwrap();
        assert!(store.peek::<Secret>(&ObjectKey::namespaced(NAMESPACE, "demo-admin-kubeconfig")).is_none());

        simulate_control_plane(&store, RELEASE_V1, "4.8.0");
        reconciler.converge(&hc).await.unwrap();

        let published = store
            .peek::<Secret>(&ObjectKey::namespaced(NAMESPACE, "demo-admin-kubeconfig"))
            .unwrap();
        assert_eq!(secret_data(&published, keys::KUBECONFIG), b"apiVersion: v1\nkind: Config\n".to_vec());
        let owners = published.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "HostedCluster");
        assert_eq!(Some(&owners[0].uid), hc.metadata.uid.as_ref());
    }

    #[tokio::test]
    async fn test_kubeconfig_source_without_key_is_retried() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));
        reconciler.converge(&hc).await.unwrap();
        set_control_plane_status(&store, settled_control_plane_status(RELEASE_V1, "4.8.0"));
        store.insert(&create_test_secret(CP_NAMESPACE, "admin-kubeconfig", &[("other", "x")]));

        let err = reconciler.converge(&hc).await.unwrap_err();
        assert!(matches!(err, ControllerError::MissingDependency(_)), "{err}");
        assert!(err.to_string().contains("has no kubeconfig key"), "{err}");
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_source_is_named() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));
        reconciler.converge(&hc).await.unwrap();
        set_control_plane_status(&store, settled_control_plane_status(RELEASE_V1, "4.8.0"));

        let err = reconciler.converge(&hc).await.unwrap_err();
        assert!(matches!(err, ControllerError::MissingDependency(_)), "{err}");
        assert!(
            err.to_string()
                .contains(&format!("kubeconfig secret {CP_NAMESPACE}/admin-kubeconfig not found")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_autoscaler_waits_for_guest_kubeconfig() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));
        reconciler.converge(&hc).await.unwrap();
        assert!(store.peek::<ServiceAccount>(&cp("cluster-autoscaler")).is_some());

        // control plane reports a kubeconfig, Cluster API has not written its own yet
        set_control_plane_status(&store, settled_control_plane_status(RELEASE_V1, "4.8.0"));
        store.insert(&create_test_secret(CP_NAMESPACE, "admin-kubeconfig", &[(keys::KUBECONFIG, "x")]));
        reconciler.converge(&hc).await.unwrap();
        assert!(store.peek::<Deployment>(&cp("cluster-autoscaler")).is_none());

        simulate_control_plane(&store, RELEASE_V1, "4.8.0");
        reconciler.converge(&hc).await.unwrap();
        let autoscaler = store.peek::<Deployment>(&cp("cluster-autoscaler")).unwrap();
        let pod = autoscaler.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("autoscaler:test"));
    }

    #[tokio::test]
    async fn test_source_secret_missing_key_is_a_configuration_error() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));
        store.insert(&create_test_secret(NAMESPACE, PULL_SECRET, &[("auth", "x")]));

        let err = reconciler.converge(&hc).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(err.to_string().contains(keys::DOCKER_CONFIG_JSON), "{err}");
    }

    #[tokio::test]
    async fn test_missing_source_secret_is_retried() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let hc = store.insert(&create_test_hosted_cluster(RELEASE_V1));

        let err = reconciler.converge(&hc).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(store.peek::<Secret>(&cp(secrets::PULL_SECRET)).is_none());
    }

    #[tokio::test]
    async fn test_incomplete_spec_is_rejected() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let mut hc = create_test_hosted_cluster(RELEASE_V1);
        hc.spec.infra_id.clear();
        let hc = seed_hosted_cluster(&store, &hc);

        let err = reconciler.converge(&hc).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Configuration);
        assert!(store.peek::<Namespace>(&ObjectKey::cluster(CP_NAMESPACE)).is_none());
    }

    #[tokio::test]
    async fn test_unmanaged_etcd_client_secret_copied() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let mut hc = create_test_hosted_cluster(RELEASE_V1);
        hc.spec.etcd = EtcdSpec {
            management_type: EtcdManagementType::Unmanaged,
            managed: None,
            unmanaged: Some(UnmanagedEtcdSpec {
                endpoint: "https://etcd.example.com:2379".to_string(),
                tls: EtcdTLSConfig {
                    client_secret: LocalObjectReference::new("etcd-client"),
                },
            }),
        };
        let hc = seed_hosted_cluster(&store, &hc);
        store.insert(&create_test_secret(
            NAMESPACE,
            "etcd-client",
            &[(keys::ETCD_CLIENT_CERT, "cert"), (keys::ETCD_CLIENT_KEY, "key"), (keys::ETCD_CLIENT_CA, "ca")],
        ));

        reconciler.converge(&hc).await.unwrap();

        let copy = store.peek::<Secret>(&cp("etcd-client")).unwrap();
        assert_eq!(copy.data.unwrap().len(), 3);
        let hcp = store.peek::<HostedControlPlane>(&hcp_key()).unwrap();
        assert_eq!(hcp.spec.etcd.management_type, EtcdManagementType::Unmanaged);
        assert_eq!(hcp.spec.etcd.unmanaged, hc.spec.etcd.unmanaged);
    }

    #[tokio::test]
    async fn test_aws_platform_credentials_and_provider() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let mut hc = create_test_hosted_cluster(RELEASE_V1);
        hc.spec.platform = PlatformSpec {
            r#type: PlatformType::Aws,
            aws: Some(AWSPlatformSpec {
                region: "us-east-1".to_string(),
                kube_cloud_controller_creds: LocalObjectReference::new("demo-ccm"),
                node_pool_management_creds: LocalObjectReference::new("demo-npm"),
                ..Default::default()
            }),
        };
        let hc = seed_hosted_cluster(&store, &hc);
        store.insert(&create_test_secret(NAMESPACE, "demo-ccm", &[(keys::AWS_CREDENTIALS, "[default]")]));
        store.insert(&create_test_secret(NAMESPACE, "demo-npm", &[(keys::AWS_CREDENTIALS, "[default]")]));

        reconciler.converge(&hc).await.unwrap();

        assert!(store.peek::<Secret>(&cp(secrets::CLOUD_CONTROLLER_CREDS)).is_some());
        assert!(store.peek::<Secret>(&cp(secrets::NODE_MANAGEMENT_CREDS)).is_some());
        assert!(store.peek::<Deployment>(&cp("capa-controller-manager")).is_some());
        let hcp = store.peek::<HostedControlPlane>(&hcp_key()).unwrap();
        let aws = hcp.spec.platform.aws.unwrap();
        assert_eq!(aws.kube_cloud_controller_creds.name, secrets::CLOUD_CONTROLLER_CREDS);

        simulate_control_plane(&store, RELEASE_V1, "4.8.0");
        reconciler.converge(&hc).await.unwrap();
        let infra = store.peek::<AWSCluster>(&cp(NAME)).unwrap();
        assert_eq!(infra.spec.region.as_deref(), Some("us-east-1"));
    }

    struct RejectingCapiManager;

    impl ResourceBuilders for RejectingCapiManager {
        fn capi_manager_deployment(&self, _deployment: &mut Deployment, image: &str) -> Result<(), ControllerError> {
            Err(ControllerError::Build(format!("Cluster API manager from {image}")))
        }
    }

    #[tokio::test]
    async fn test_builder_override_failure_stops_converge() {
        let store = MockStore::new();
        let (reconciler, _clock) = create_test_reconciler(&store);
        let reconciler = reconciler.with_builders(Arc::new(RejectingCapiManager));
        let hc = seed_hosted_cluster(&store, &create_test_hosted_cluster(RELEASE_V1));

        let err = reconciler.converge(&hc).await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(err.to_string().contains("Cluster API manager from capi:test"), "{err}");
        assert!(store.peek::<Deployment>(&cp("cluster-api")).is_none());
        assert!(store.peek::<HostedControlPlane>(&hcp_key()).is_some());
    }
}
