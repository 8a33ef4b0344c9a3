//! Ignition server: service, route and deployment

use crds::{PublishingStrategyType, Route, RouteTargetReference, ServicePublishingStrategy, TLSConfig};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, Probe, Service, ServicePort, ServiceSpec, TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::deployments::{deployment_spec, restart_annotations};
use super::{Component, master_toleration, mount, requests, secret_volume, string_map, strings};
use crate::error::ControllerError;
use crate::manifests::{annotations, keys, secrets};

/// Port the ignition server listens on
pub const IGNITION_SERVER_PORT: i32 = 9090;

const SERVING_CERT_DIR: &str = "/var/run/secrets/ignition/serving-cert";

pub(super) fn service(service: &mut Service, strategy: &ServicePublishingStrategy) -> Result<(), ControllerError> {
    let selector = string_map(&[("app", Component::IgnitionServer.name())]);
    let spec = service.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(selector);

    let ports = spec.ports.get_or_insert_with(Vec::new);
    if ports.is_empty() {
        ports.push(ServicePort::default());
    }
    let port = &mut ports[0];
    port.name = Some("https".to_string());
    port.port = 443;
    port.protocol = Some("TCP".to_string());
    port.target_port = Some(IntOrString::Int(IGNITION_SERVER_PORT));

    match strategy.strategy_type() {
        PublishingStrategyType::NodePort => {
            spec.type_ = Some("NodePort".to_string());
            let requested = strategy.node_port.as_ref().and_then(|np| np.port);
            if port.node_port.unwrap_or(0) == 0 {
                port.node_port = requested;
            }
        }
        PublishingStrategyType::Route => {
            spec.type_ = Some("ClusterIP".to_string());
            port.node_port = None;
        }
        _ => {
            return Err(ControllerError::InvalidConfig(format!(
                "invalid publishing strategy for Ignition service: {}",
                strategy.r#type
            )));
        }
    }
    Ok(())
}

pub(super) fn route(route: &mut Route) {
    route.spec.tls = Some(TLSConfig {
        termination: "passthrough".to_string(),
    });
    route.spec.to = RouteTargetReference {
        kind: "Service".to_string(),
        name: Component::IgnitionServer.name().to_string(),
        weight: Some(100),
    };
}

fn tcp_probe(initial_delay: i32, failure_threshold: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(IGNITION_SERVER_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        timeout_seconds: Some(5),
        period_seconds: Some(60),
        failure_threshold: Some(failure_threshold),
        success_threshold: Some(1),
        ..Default::default()
    }
}

pub(super) fn deployment(deployment: &mut Deployment, image: &str, restart_date: Option<&str>) {
    let name = Component::IgnitionServer.name();
    let container = Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        command: Some(strings(&["/usr/bin/ignition-server"])),
        args: Some(vec![
            "start".to_string(),
            "--cert-file".to_string(),
            format!("{SERVING_CERT_DIR}/{}", keys::TLS_CERT),
            "--key-file".to_string(),
            format!("{SERVING_CERT_DIR}/{}", keys::TLS_KEY),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("https".to_string()),
            container_port: IGNITION_SERVER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        liveness_probe: Some(tcp_probe(120, 6)),
        readiness_probe: Some(tcp_probe(5, 3)),
        volume_mounts: Some(vec![mount("serving-cert", SERVING_CERT_DIR, false)]),
        resources: Some(requests("40Mi", "10m")),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(name.to_string()),
        termination_grace_period_seconds: Some(10),
        tolerations: Some(vec![master_toleration()]),
        containers: vec![container],
        volumes: Some(vec![secret_volume("serving-cert", secrets::IGNITION_SERVING_CERT, None)]),
        ..Default::default()
    };

    let metadata_annotations = deployment.metadata.annotations.get_or_insert_with(Default::default);
    match restart_date {
        Some(date) => {
            metadata_annotations.insert(annotations::RESTART_DATE.to_string(), date.to_string());
        }
        None => {
            metadata_annotations.remove(annotations::RESTART_DATE);
        }
    }
    deployment.spec = Some(deployment_spec(
        string_map(&[("app", name)]),
        restart_annotations(restart_date),
        pod,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::NodePortPublishingStrategy;

    fn strategy(kind: &str, port: Option<i32>) -> ServicePublishingStrategy {
        ServicePublishingStrategy {
            r#type: kind.to_string(),
            node_port: port.map(|port| NodePortPublishingStrategy {
                address: "10.0.0.10".to_string(),
                port: Some(port),
            }),
        }
    }

    fn first_port(svc: &Service) -> &ServicePort {
        &svc.spec.as_ref().unwrap().ports.as_ref().unwrap()[0]
    }

    #[test]
    fn test_node_port_kept_once_allocated() {
        let mut svc = Service::default();
        service(&mut svc, &strategy("NodePort", Some(30080))).unwrap();
        assert_eq!(first_port(&svc).node_port, Some(30080));
        assert_eq!(svc.spec.as_ref().unwrap().type_.as_deref(), Some("NodePort"));

        service(&mut svc, &strategy("NodePort", Some(30999))).unwrap();
        assert_eq!(first_port(&svc).node_port, Some(30080));
    }

    #[test]
    fn test_route_strategy_uses_cluster_ip() {
        let mut svc = Service::default();
        service(&mut svc, &strategy("NodePort", Some(30080))).unwrap();
        service(&mut svc, &strategy("Route", None)).unwrap();

        assert_eq!(svc.spec.as_ref().unwrap().type_.as_deref(), Some("ClusterIP"));
        assert_eq!(first_port(&svc).node_port, None);
        assert_eq!(first_port(&svc).target_port, Some(IntOrString::Int(9090)));
    }

    #[test]
    fn test_other_strategies_rejected() {
        let mut svc = Service::default();
        let err = service(&mut svc, &strategy("LoadBalancer", None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: invalid publishing strategy for Ignition service: LoadBalancer"
        );
    }

    #[test]
    fn test_route_passthrough() {
        let mut r = Route::default();
        route(&mut r);
        assert_eq!(r.spec.tls.unwrap().termination, "passthrough");
        assert_eq!(r.spec.to.name, "ignition-server");
        assert_eq!(r.spec.to.weight, Some(100));
    }

    #[test]
    fn test_deployment_probes() {
        let mut d = Deployment::default();
        deployment(&mut d, "ignition:v1", None);

        let pod = d.spec.unwrap().template.spec.unwrap();
        let container = &pod.containers[0];
        let liveness = container.liveness_probe.as_ref().unwrap();
        assert_eq!(liveness.initial_delay_seconds, Some(120));
        assert_eq!(liveness.failure_threshold, Some(6));
        let readiness = container.readiness_probe.as_ref().unwrap();
        assert_eq!(readiness.initial_delay_seconds, Some(5));
        assert_eq!(
            container.args.as_ref().unwrap()[2],
            "/var/run/secrets/ignition/serving-cert/tls.crt"
        );
    }
}
