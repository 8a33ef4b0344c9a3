//! Kubernetes object references used across the hosted-cluster CRDs
//!
//! `LocalObjectReference` points at an object in the referencing object's
//! namespace. `TypedObjectReference` follows the core `ObjectReference`
//! shape (apiVersion, kind, namespace, name) and is what Cluster API expects
//! for `controlPlaneRef` and `infrastructureRef`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to an object in the same namespace as the referencing object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Name of the referenced object
    #[serde(default)]
    pub name: String,
}

impl LocalObjectReference {
    /// Create a reference to the named object
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the name if the reference is actually set
    ///
    /// Optional references are frequently serialized as `{name: ""}` by
    /// clients, so an empty name counts as "not specified".
    #[must_use]
    pub fn specified(&self) -> Option<&str> {
        if self.name.is_empty() {
            None
        } else {
            Some(&self.name)
        }
    }
}

/// Returns the referenced name for an optional reference, treating an empty
/// name the same as an absent reference.
#[must_use]
pub fn specified_name(reference: Option<&LocalObjectReference>) -> Option<&str> {
    reference.and_then(LocalObjectReference::specified)
}

/// Fully typed reference (apiVersion/kind/namespace/name)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TypedObjectReference {
    /// API version of the referenced resource (e.g., "hypershift.openshift.io/v1alpha1")
    pub api_version: String,

    /// Kind of the referenced resource (e.g., "HostedControlPlane")
    pub kind: String,

    /// Namespace of the referenced resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the referenced resource
    pub name: String,
}

impl TypedObjectReference {
    /// Build a reference from any typed resource with static type information
    pub fn for_resource<K>(namespace: &str, name: &str) -> Self
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }
}

/// Reference to a key inside a secret
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyReference {
    /// Name of the secret
    pub name: String,

    /// Data key within the secret
    pub key: String,
}
