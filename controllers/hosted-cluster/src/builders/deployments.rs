//! Deployments of the per-cluster operators

use std::collections::BTreeMap;

use crds::ClusterAutoscaling;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, KeyToPath, PodSecurityContext, PodSpec,
    PodTemplateSpec, Probe, SecretVolumeSource, Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{
    Component, master_toleration, mount, namespace_env, requests, secret_volume, string_map, strings,
};
use crate::manifests::{annotations, keys, secrets};

const WEBHOOK_CERT_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";
const AWS_CREDENTIALS_DIR: &str = "/home/.aws";
const TARGET_KUBECONFIG_DIR: &str = "/mnt/kubeconfig";
const TARGET_KUBECONFIG_FILE: &str = "target-kubeconfig";

/// Spec shared by every deployment: one replica selected by `labels`
pub(super) fn deployment_spec(
    labels: BTreeMap<String, String>,
    pod_annotations: Option<BTreeMap<String, String>>,
    pod: PodSpec,
) -> DeploymentSpec {
    DeploymentSpec {
        replicas: Some(1),
        selector: LabelSelector {
            match_labels: Some(labels.clone()),
            ..Default::default()
        },
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels),
                annotations: pod_annotations,
                ..Default::default()
            }),
            spec: Some(pod),
        },
        ..Default::default()
    }
}

pub(super) fn restart_annotations(restart_date: Option<&str>) -> Option<BTreeMap<String, String>> {
    restart_date.map(|date| string_map(&[(annotations::RESTART_DATE, date)]))
}

pub(super) fn capi_manager(deployment: &mut Deployment, image: &str) {
    let container = Container {
        name: "manager".to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![namespace_env()]),
        command: Some(strings(&["/manager"])),
        args: Some(strings(&["--namespace", "$(MY_NAMESPACE)", "--alsologtostderr", "--v=4"])),
        volume_mounts: Some(vec![mount("capi-webhooks-tls", WEBHOOK_CERT_DIR, false)]),
        resources: Some(requests("20Mi", "10m")),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(Component::ClusterApiManager.name().to_string()),
        containers: vec![container],
        volumes: Some(vec![secret_volume("capi-webhooks-tls", secrets::CAPI_WEBHOOKS_TLS, Some(420))]),
        ..Default::default()
    };
    deployment.spec = Some(deployment_spec(string_map(&[("name", "cluster-api")]), None, pod));
}

pub(super) fn capi_aws_provider(deployment: &mut Deployment, image: &str) {
    let healthz = IntOrString::String("healthz".to_string());
    let probe = |path: &str| Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: healthz.clone(),
            ..Default::default()
        }),
        ..Default::default()
    };

    let container = Container {
        name: "manager".to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![
            namespace_env(),
            EnvVar {
                name: "AWS_SHARED_CREDENTIALS_FILE".to_string(),
                value: Some(format!("{AWS_CREDENTIALS_DIR}/{}", keys::AWS_CREDENTIALS)),
                ..Default::default()
            },
        ]),
        command: Some(strings(&["/manager"])),
        args: Some(strings(&[
            "--namespace",
            "$(MY_NAMESPACE)",
            "--alsologtostderr",
            "--v=4",
        ])),
        ports: Some(vec![ContainerPort {
            name: Some("healthz".to_string()),
            container_port: 9440,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        liveness_probe: Some(probe("/healthz")),
        readiness_probe: Some(probe("/readyz")),
        volume_mounts: Some(vec![
            mount("capi-webhooks-tls", WEBHOOK_CERT_DIR, false),
            mount("credentials", AWS_CREDENTIALS_DIR, false),
        ]),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(Component::CapiAwsProvider.name().to_string()),
        termination_grace_period_seconds: Some(10),
        tolerations: Some(vec![master_toleration()]),
        containers: vec![container],
        volumes: Some(vec![
            secret_volume("capi-webhooks-tls", secrets::CAPI_WEBHOOKS_TLS, Some(420)),
            secret_volume("credentials", secrets::NODE_MANAGEMENT_CREDS, None),
        ]),
        ..Default::default()
    };
    deployment.spec = Some(deployment_spec(
        string_map(&[("control-plane", Component::CapiAwsProvider.deployment_name())]),
        None,
        pod,
    ));
}

/// Command line of the cluster autoscaler
pub(super) fn autoscaler_args(options: &ClusterAutoscaling) -> Vec<String> {
    let mut args = strings(&[
        "--cloud-provider=clusterapi",
        "--node-group-auto-discovery=clusterapi:namespace=$(MY_NAMESPACE)",
    ]);
    args.push(format!("--kubeconfig={TARGET_KUBECONFIG_DIR}/{TARGET_KUBECONFIG_FILE}"));
    args.extend(strings(&[
        "--clusterapi-cloud-config-authoritative",
        "--skip-nodes-with-local-storage=false",
        "--alsologtostderr",
        "--v=4",
    ]));

    if let Some(max) = options.max_nodes_total {
        args.push(format!("--max-nodes-total={max}"));
    }
    if let Some(grace) = options.max_pod_grace_period {
        args.push(format!("--max-graceful-termination-sec={grace}"));
    }
    if let Some(provision) = options.max_node_provision_time.as_deref().filter(|t| !t.is_empty()) {
        args.push(format!("--max-node-provision-time={provision}"));
    }
    if let Some(priority) = options.pod_priority_threshold {
        args.push(format!("--expendable-pods-priority-cutoff={priority}"));
    }
    args
}

pub(super) fn autoscaler(
    deployment: &mut Deployment,
    image: &str,
    kubeconfig_secret: &str,
    options: &ClusterAutoscaling,
) {
    let container = Container {
        name: Component::Autoscaler.name().to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![namespace_env()]),
        command: Some(strings(&["/cluster-autoscaler"])),
        args: Some(autoscaler_args(options)),
        volume_mounts: Some(vec![mount("target-kubeconfig", TARGET_KUBECONFIG_DIR, false)]),
        resources: Some(requests("35Mi", "10m")),
        ..Default::default()
    };
    let kubeconfig_volume = Volume {
        name: "target-kubeconfig".to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(kubeconfig_secret.to_string()),
            items: Some(vec![KeyToPath {
                key: keys::CAPI_KUBECONFIG.to_string(),
                path: TARGET_KUBECONFIG_FILE.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(Component::Autoscaler.name().to_string()),
        termination_grace_period_seconds: Some(10),
        tolerations: Some(vec![master_toleration()]),
        containers: vec![container],
        volumes: Some(vec![kubeconfig_volume]),
        ..Default::default()
    };
    deployment.spec = Some(deployment_spec(
        string_map(&[("app", Component::Autoscaler.name())]),
        None,
        pod,
    ));
}

pub(super) fn control_plane_operator(deployment: &mut Deployment, image: &str, restart_date: Option<&str>) {
    let name = Component::ControlPlaneOperator.name();
    let container = Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        env: Some(vec![namespace_env()]),
        command: Some(strings(&["/usr/bin/control-plane-operator"])),
        args: Some(strings(&[
            "run",
            "--namespace",
            "$(MY_NAMESPACE)",
            "--deployment-name",
            name,
        ])),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(name.to_string()),
        security_context: Some(PodSecurityContext {
            run_as_user: Some(1000),
            ..Default::default()
        }),
        containers: vec![container],
        ..Default::default()
    };
    deployment.spec = Some(deployment_spec(
        string_map(&[("name", name)]),
        restart_annotations(restart_date),
        pod,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(deployment: &Deployment) -> &PodSpec {
        deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .unwrap()
    }

    #[test]
    fn test_autoscaler_optional_args() {
        let defaults = autoscaler_args(&ClusterAutoscaling::default());
        assert_eq!(defaults.len(), 7);
        assert!(defaults.contains(&"--kubeconfig=/mnt/kubeconfig/target-kubeconfig".to_string()));

        let args = autoscaler_args(&ClusterAutoscaling {
            max_nodes_total: Some(12),
            max_pod_grace_period: Some(300),
            max_node_provision_time: Some("15m".to_string()),
            pod_priority_threshold: Some(-10),
        });
        assert_eq!(
            &args[7..],
            &[
                "--max-nodes-total=12",
                "--max-graceful-termination-sec=300",
                "--max-node-provision-time=15m",
                "--expendable-pods-priority-cutoff=-10",
            ]
        );
    }

    #[test]
    fn test_autoscaler_mounts_capi_kubeconfig() {
        let mut deployment = Deployment::default();
        autoscaler(&mut deployment, "autoscaler:v1", "demo-abcde-kubeconfig", &ClusterAutoscaling::default());

        let volume = &pod(&deployment).volumes.as_ref().unwrap()[0];
        let secret = volume.secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("demo-abcde-kubeconfig"));
        assert_eq!(secret.items.as_ref().unwrap()[0].key, "value");
    }

    #[test]
    fn test_control_plane_operator_restart_annotation() {
        let mut deployment = Deployment::default();
        control_plane_operator(&mut deployment, "cpo:v1", Some("2026-10-01"));

        let template = &deployment.spec.as_ref().unwrap().template;
        let annotations = template.metadata.as_ref().and_then(|m| m.annotations.as_ref()).unwrap();
        assert_eq!(annotations[annotations::RESTART_DATE], "2026-10-01");
        assert_eq!(
            pod(&deployment).security_context.as_ref().and_then(|s| s.run_as_user),
            Some(1000)
        );

        let mut plain = Deployment::default();
        control_plane_operator(&mut plain, "cpo:v1", None);
        assert!(plain.spec.unwrap().template.metadata.unwrap().annotations.is_none());
    }

    #[test]
    fn test_capi_provider_uses_node_management_creds() {
        let mut deployment = Deployment::default();
        capi_aws_provider(&mut deployment, "capa:v1");

        let volumes = pod(&deployment).volumes.as_ref().unwrap();
        assert!(volumes.iter().any(|v| {
            v.secret.as_ref().and_then(|s| s.secret_name.as_deref()) == Some(secrets::NODE_MANAGEMENT_CREDS)
        }));
        let labels = deployment.spec.unwrap().selector.match_labels.unwrap();
        assert_eq!(labels["control-plane"], "capa-controller-manager");
    }
}
