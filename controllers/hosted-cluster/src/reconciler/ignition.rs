//! Ignition server exposure, certificates and deployment

use crds::{HostedCluster, PublishingStrategyType, Route, services};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use object_store::{ObjectKey, ObjectStore};
use tracing::debug;

use crate::builders::{Component, has_tls_material, tls_secret};
use crate::error::ControllerError;
use crate::manifests::{in_namespace, keys, secrets};
use crate::pki::CertificateAuthority;
use crate::reconciler::Reconciler;
use crate::reconciler::components::restart_date;

fn pem_field(secret: &Secret, key: &str) -> Result<String, ControllerError> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| ControllerError::Pki(format!("CA secret has no {key}")))?;
    String::from_utf8(bytes.0.clone()).map_err(|e| ControllerError::Pki(format!("CA secret {key} is not PEM: {e}")))
}

impl<S: ObjectStore> Reconciler<S> {
    /// Service and route first; certificates and the deployment once the
    /// server has an externally resolvable name
    pub(crate) async fn sync_ignition(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
    ) -> Result<(), ControllerError> {
        let strategy = hc.publishing_strategy(services::IGNITION).ok_or_else(|| {
            ControllerError::InvalidConfig("Ignition service strategy not specified".to_string())
        })?;
        let component = Component::IgnitionServer;
        let key = in_namespace(cp_namespace, component.name());

        self.sync::<Service, _>(owner, &key, |svc| self.builders.ignition_service(svc, strategy))
            .await?;

        let host = match strategy.strategy_type() {
            PublishingStrategyType::Route => {
                let (route, _) = self
                    .sync::<Route, _>(owner, &key, |route| self.builders.ignition_route(route))
                    .await?;
                Some(route.spec.host).filter(|h| !h.is_empty())
            }
            PublishingStrategyType::NodePort => {
                let node_port = strategy.node_port.as_ref().ok_or_else(|| {
                    ControllerError::InvalidConfig("nodeport metadata not specified for ignition service".to_string())
                })?;
                Some(node_port.address.clone()).filter(|a| !a.is_empty())
            }
            _ => None,
        };
        let Some(host) = host else {
            debug!("HostedCluster {}: ignition server has no external name yet", owner);
            return Ok(());
        };

        let (ca_secret, _) = self
            .sync::<Secret, _>(owner, &in_namespace(cp_namespace, secrets::IGNITION_CA), |secret| {
                if has_tls_material(secret) {
                    return Ok(());
                }
                let ca = CertificateAuthority::generate("ignition-root-ca", "openshift")?;
                tls_secret(secret, ca.pair());
                Ok(())
            })
            .await?;

        self.sync::<Secret, _>(owner, &in_namespace(cp_namespace, secrets::IGNITION_SERVING_CERT), |secret| {
            if has_tls_material(secret) {
                return Ok(());
            }
            let ca = CertificateAuthority::from_pem(
                &pem_field(&ca_secret, keys::TLS_CERT)?,
                &pem_field(&ca_secret, keys::TLS_KEY)?,
            )?;
            let pair = ca.issue_serving_cert("ignition-server", "openshift", &[host.as_str()])?;
            tls_secret(secret, &pair);
            Ok(())
        })
        .await?;

        self.sync_component_rbac(owner, cp_namespace, component).await?;

        let image = &self.settings.images.ignition_server;
        let restart = restart_date(hc);
        self.sync::<Deployment, _>(owner, &in_namespace(cp_namespace, component.deployment_name()), |d| {
            self.builders.ignition_deployment(d, image, restart)
        })
        .await?;
        Ok(())
    }
}
