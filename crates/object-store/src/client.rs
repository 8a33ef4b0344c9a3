//! kube-backed object store
//!
//! Typed objects are round-tripped through `DynamicObject` so one code path
//! serves every kind, with the `ApiResource` derived from the static type.

use std::future::Future;
use std::time::Duration;

use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StoreError;
use crate::key::ObjectKey;
use crate::store_trait::{DeleteOutcome, ObjectStore, StoreObject};

/// Object store over a live Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    call_timeout: Option<Duration>,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Create a store from a kube client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            call_timeout: None,
        }
    }

    /// Abort any single API call that takes longer than `timeout`
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Underlying client
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: StoreObject>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = ApiResource::erase::<K>(&());
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    async fn call<T, F>(&self, kind: &str, key: &ObjectKey, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        let result = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_elapsed| {
                debug!("{} {} exceeded {:?}", kind, key, limit);
                StoreError::Cancelled(format!("{kind} {key}: exceeded {limit:?}"))
            })?,
            None => fut.await,
        };
        result.map_err(|e| map_kube_error(kind, key, e))
    }
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).into_owned()
}

fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn key_of<K: StoreObject>(obj: &K) -> Result<ObjectKey, StoreError> {
    ObjectKey::from_resource(obj)
        .ok_or_else(|| StoreError::InvalidObject(format!("{} without a name", kind_of::<K>())))
}

fn map_kube_error(kind: &str, key: &ObjectKey, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::not_found(kind, key),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::conflict(kind, key),
        kube::Error::Api(ae) => StoreError::Api(format!("{} {}: {}", kind, key, ae.message)),
        other => StoreError::Kube(other),
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        let api = self.api::<K>(key.namespace.as_deref());
        let found = self.call(&kind_of::<K>(), key, api.get_opt(&key.name)).await?;
        found.map(from_dynamic).transpose()
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let api = self.api::<K>(namespace);
        let key = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: "*".to_string(),
        };
        let list = self
            .call(&kind_of::<K>(), &key, api.list(&ListParams::default()))
            .await?;
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let api = self.api::<K>(key.namespace.as_deref());
        let data = to_dynamic(obj)?;
        let created = self
            .call(&kind_of::<K>(), &key, api.create(&PostParams::default(), &data))
            .await?;
        from_dynamic(created)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let api = self.api::<K>(key.namespace.as_deref());
        let data = to_dynamic(obj)?;
        let updated = self
            .call(
                &kind_of::<K>(),
                &key,
                api.replace(&key.name, &PostParams::default(), &data),
            )
            .await?;
        from_dynamic(updated)
    }

    async fn patch<K: StoreObject>(
        &self,
        key: &ObjectKey,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError> {
        let api = self.api::<K>(key.namespace.as_deref());
        let patched = self
            .call(
                &kind_of::<K>(),
                key,
                api.patch(&key.name, &PatchParams::default(), &Patch::Merge(patch)),
            )
            .await?;
        from_dynamic(patched)
    }

    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let api = self.api::<K>(key.namespace.as_deref());
        let value = serde_json::to_value(obj)?;
        // resourceVersion in a merge patch is a precondition: stale => 409
        let body = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": value.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });
        let updated = self
            .call(
                &kind_of::<K>(),
                &key,
                api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&body)),
            )
            .await?;
        from_dynamic(updated)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<DeleteOutcome, StoreError> {
        let api = self.api::<K>(key.namespace.as_deref());
        match self
            .call(&kind_of::<K>(), key, api.delete(&key.name, &DeleteParams::default()))
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.is_not_found() => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e),
        }
    }
}

/// Identity check used by the sync primitives
pub(crate) fn ensure_identity<K: Resource>(obj: &K, key: &ObjectKey) -> Result<(), StoreError> {
    let meta = obj.meta();
    if meta.name.as_deref() != Some(key.name.as_str()) || meta.namespace != key.namespace {
        return Err(StoreError::InvalidObject(format!(
            "mutate changed identity of {} to {}/{}",
            key,
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default(),
        )));
    }
    Ok(())
}
