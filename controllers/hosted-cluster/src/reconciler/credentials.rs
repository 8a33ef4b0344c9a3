//! Credential copies and global configuration fan-out

use crds::{EtcdManagementType, HostedCluster, specified_name};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use object_store::{ObjectKey, ObjectStore};
use tracing::debug;

use crate::builders::{DOCKER_CONFIG_JSON_TYPE, SecretCopy, copy_secret, mirror_config_map, mirror_secret};
use crate::error::ControllerError;
use crate::manifests::{in_namespace, keys, secrets};
use crate::platform::PlatformSupport;
use crate::reconciler::Reconciler;

/// Secrets copied for every platform, in copy order
pub(crate) fn common_secret_copies(hc: &HostedCluster) -> Vec<SecretCopy> {
    let mut copies = vec![
        SecretCopy::key("pull", &hc.spec.pull_secret.name, secrets::PULL_SECRET, keys::DOCKER_CONFIG_JSON)
            .with_type(DOCKER_CONFIG_JSON_TYPE),
    ];
    if let Some(name) = specified_name(hc.spec.audit_webhook.as_ref()) {
        copies.push(SecretCopy::key("audit webhook", name, name, keys::AUDIT_WEBHOOK_KUBECONFIG));
    }
    if let Some(name) = specified_name(hc.spec.signing_key.as_ref()) {
        copies.push(SecretCopy::key("signing key", name, secrets::SIGNING_KEY, keys::SIGNING_KEY));
    }
    if let Some(name) = hc.spec.ssh_key.specified() {
        copies.push(SecretCopy::key("ssh key", name, secrets::SSH_KEY, keys::SSH_PUBLIC_KEY));
    }
    if hc.spec.etcd.management_type == EtcdManagementType::Unmanaged {
        let client_secret = hc
            .spec
            .etcd
            .unmanaged
            .as_ref()
            .and_then(|u| u.tls.client_secret.specified());
        if let Some(name) = client_secret {
            copies.push(SecretCopy::all("etcd client", name));
        }
    }
    copies
}

impl<S: ObjectStore> Reconciler<S> {
    /// Copy referenced credentials into the control plane namespace
    pub(crate) async fn sync_credentials(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
        platform: &dyn PlatformSupport<S>,
    ) -> Result<(), ControllerError> {
        let mut copies = platform.credential_copies(hc)?;
        copies.extend(common_secret_copies(hc));
        for copy in &copies {
            self.copy_credential(owner, cp_namespace, copy).await?;
        }
        Ok(())
    }

    async fn copy_credential(
        &self,
        owner: &ObjectKey,
        cp_namespace: &str,
        copy: &SecretCopy,
    ) -> Result<(), ControllerError> {
        if copy.source.is_empty() {
            return Err(ControllerError::InvalidConfig(format!(
                "hostedcluster {} secret reference is empty",
                copy.description
            )));
        }
        let namespace = owner.namespace.as_deref().unwrap_or_default();
        let source = self
            .store
            .get::<Secret>(&ObjectKey::namespaced(namespace, &copy.source))
            .await?
            .ok_or_else(|| {
                ControllerError::MissingDependency(format!(
                    "{} secret {}/{} not found",
                    copy.description, namespace, copy.source
                ))
            })?;
        self.sync::<Secret, _>(owner, &in_namespace(cp_namespace, &copy.target), |dest| {
            copy_secret(dest, &source, copy)
        })
        .await?;
        Ok(())
    }

    /// Mirror user-referenced config maps and secrets; the first failure aborts the pass
    pub(crate) async fn sync_global_config(
        &self,
        hc: &HostedCluster,
        owner: &ObjectKey,
        cp_namespace: &str,
    ) -> Result<(), ControllerError> {
        let Some(configuration) = &hc.spec.configuration else {
            return Ok(());
        };
        let namespace = owner.namespace.as_deref().unwrap_or_default();

        for reference in &configuration.config_map_refs {
            let source = self
                .store
                .get::<ConfigMap>(&ObjectKey::namespaced(namespace, &reference.name))
                .await?
                .ok_or_else(|| {
                    ControllerError::MissingDependency(format!(
                        "configuration configmap {}/{} not found",
                        namespace, reference.name
                    ))
                })?;
            self.sync::<ConfigMap, _>(owner, &in_namespace(cp_namespace, &reference.name), |dest| {
                mirror_config_map(dest, &source);
                Ok(())
            })
            .await?;
        }

        for reference in &configuration.secret_refs {
            let source = self
                .store
                .get::<Secret>(&ObjectKey::namespaced(namespace, &reference.name))
                .await?
                .ok_or_else(|| {
                    ControllerError::MissingDependency(format!(
                        "configuration secret {}/{} not found",
                        namespace, reference.name
                    ))
                })?;
            self.sync::<Secret, _>(owner, &in_namespace(cp_namespace, &reference.name), |dest| {
                mirror_secret(dest, &source);
                Ok(())
            })
            .await?;
        }

        debug!(
            "HostedCluster {}: mirrored {} configmaps and {} secrets",
            owner,
            configuration.config_map_refs.len(),
            configuration.secret_refs.len()
        );
        Ok(())
    }
}
