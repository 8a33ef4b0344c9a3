//! ObjectStore trait for mocking
//!
//! Abstracts the Kubernetes API so reconcilers can be exercised against the
//! in-memory mock. The concrete [`KubeStore`](crate::KubeStore) implements
//! this trait over `kube::Client`.

use std::fmt::Debug;

use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::key::ObjectKey;

/// Any resource the store can carry
///
/// Blanket-implemented for every typed resource with static type information,
/// including k8s-openapi types and `#[derive(CustomResource)]` kinds.
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + Debug + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = ()> + Clone + Debug + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Delete accepted; the object may linger while finalizers run
    Deleted,
    /// Object was already absent
    NotFound,
}

/// Trait for object store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` if it does not exist
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>;

    /// List objects of a kind, optionally restricted to one namespace
    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError>;

    /// Create a new object (status is ignored)
    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an existing object
    ///
    /// Fails with [`StoreError::Conflict`] when `metadata.resourceVersion`
    /// is stale.
    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Apply a JSON merge patch to an existing object (status is ignored)
    async fn patch<K: StoreObject>(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError>;

    /// Replace the status block of an existing object
    ///
    /// Fails with [`StoreError::Conflict`] when `metadata.resourceVersion`
    /// is stale.
    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Request deletion
    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<DeleteOutcome, StoreError>;
}
