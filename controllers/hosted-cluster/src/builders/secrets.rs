//! Copied, mirrored and generated secrets

use std::collections::BTreeMap;

use crds::HostedCluster;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Resource;

use crate::error::ControllerError;
use crate::manifests::keys;
use crate::pki::CertificateKeyPair;

/// Type of TLS secrets
pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

/// Type of pull secrets
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// What part of the source secret is copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopiedContent {
    /// A single required key
    Key(&'static str),
    /// The whole data map
    All,
}

/// A secret in the HostedCluster's namespace copied into the control plane namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretCopy {
    /// Source secret name, next to the HostedCluster
    pub source: String,
    /// Target secret name in the control plane namespace
    pub target: String,
    /// Copied content
    pub content: CopiedContent,
    /// Secret type of the copy
    pub secret_type: Option<&'static str>,
    /// Human name used in error messages (e.g., "pull")
    pub description: &'static str,
}

impl SecretCopy {
    /// Copy of a single required key
    pub fn key(description: &'static str, source: &str, target: &str, key: &'static str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            content: CopiedContent::Key(key),
            secret_type: None,
            description,
        }
    }

    /// Copy of the whole data map under the same name
    pub fn all(description: &'static str, name: &str) -> Self {
        Self {
            source: name.to_string(),
            target: name.to_string(),
            content: CopiedContent::All,
            secret_type: None,
            description,
        }
    }

    /// Set the type of the copy
    #[must_use]
    pub fn with_type(mut self, secret_type: &'static str) -> Self {
        self.secret_type = Some(secret_type);
        self
    }
}

pub(crate) fn copy_secret(dest: &mut Secret, source: &Secret, copy: &SecretCopy) -> Result<(), ControllerError> {
    let data = match &copy.content {
        CopiedContent::Key(key) => {
            let value = source
                .data
                .as_ref()
                .and_then(|d| d.get(*key))
                .ok_or_else(|| {
                    ControllerError::InvalidConfig(format!(
                        "hostedcluster {} secret \"{}\" must have a {} key",
                        copy.description, copy.source, key
                    ))
                })?;
            BTreeMap::from([((*key).to_string(), value.clone())])
        }
        CopiedContent::All => source.data.clone().unwrap_or_default(),
    };
    dest.data = Some(data);
    dest.type_ = copy.secret_type.map(str::to_string);
    Ok(())
}

pub(crate) fn mirror_config_map(dest: &mut ConfigMap, source: &ConfigMap) {
    dest.metadata.annotations.clone_from(&source.metadata.annotations);
    dest.metadata.labels.clone_from(&source.metadata.labels);
    dest.data.clone_from(&source.data);
    dest.binary_data.clone_from(&source.binary_data);
    dest.immutable = source.immutable;
}

pub(crate) fn mirror_secret(dest: &mut Secret, source: &Secret) {
    dest.metadata.annotations.clone_from(&source.metadata.annotations);
    dest.metadata.labels.clone_from(&source.metadata.labels);
    dest.data.clone_from(&source.data);
    dest.immutable = source.immutable;
    dest.type_.clone_from(&source.type_);
}

/// Admin kubeconfig published next to the HostedCluster, owned by it
pub(crate) fn publish_kubeconfig(
    dest: &mut Secret,
    kubeconfig: &ByteString,
    hc: &HostedCluster,
) -> Result<(), ControllerError> {
    let owner = hc
        .controller_owner_ref(&())
        .ok_or_else(|| ControllerError::Build("kubeconfig owner reference: HostedCluster has no uid".to_string()))?;
    dest.metadata.owner_references = Some(vec![owner]);
    dest.type_ = Some("Opaque".to_string());
    dest.data = Some(BTreeMap::from([(keys::KUBECONFIG.to_string(), kubeconfig.clone())]));
    Ok(())
}

pub(crate) fn tls_secret(secret: &mut Secret, pair: &CertificateKeyPair) {
    secret.type_ = Some(TLS_SECRET_TYPE.to_string());
    secret.data = Some(BTreeMap::from([
        (keys::TLS_CERT.to_string(), ByteString(pair.cert_pem.clone().into_bytes())),
        (keys::TLS_KEY.to_string(), ByteString(pair.key_pem.clone().into_bytes())),
    ]));
}

/// True when the secret already carries a certificate and key
pub(crate) fn has_tls_material(secret: &Secret) -> bool {
    secret
        .data
        .as_ref()
        .is_some_and(|d| d.contains_key(keys::TLS_CERT) && d.contains_key(keys::TLS_KEY))
}
