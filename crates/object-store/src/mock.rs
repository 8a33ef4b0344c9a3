//! Mock ObjectStore for unit testing
//!
//! Objects are held as JSON keyed by apiVersion/kind/namespace/name and
//! behave like a small API server: `resourceVersion` based optimistic
//! concurrency, status only writable through `update_status`, finalizers
//! holding deletion until they are removed, and namespace deletion cascading
//! to everything inside.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::SecondsFormat;
use serde_json::{Value, json};

use crate::error::StoreError;
use crate::key::ObjectKey;
use crate::merge::apply_merge_patch;
use crate::store_trait::{DeleteOutcome, ObjectStore, StoreObject};

/// Store verbs, for failure injection and the action log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Patch,
    UpdateStatus,
    Delete,
}

impl Verb {
    fn is_write(self) -> bool {
        !matches!(self, Verb::Get | Verb::List)
    }
}

/// Failure to inject on a future call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Respond with a conflict
    Conflict,
    /// Respond with an API error carrying this message
    Api(String),
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Verb used
    pub verb: Verb,
    /// Resource kind
    pub kind: String,
    /// Object key (`*` name for lists)
    pub key: String,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Value>,
    next_version: u64,
    actions: Vec<Action>,
    failures: Vec<(Verb, String, Failure)>,
}

/// In-memory object store
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
}

fn storage_key(api_version: &str, kind: &str, key: &ObjectKey) -> String {
    format!(
        "{}|{}|{}|{}",
        api_version,
        kind,
        key.namespace.as_deref().unwrap_or_default(),
        key.name
    )
}

fn type_prefix(api_version: &str, kind: &str) -> String {
    format!("{api_version}|{kind}|")
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn metadata(value: &mut Value) -> Option<&mut serde_json::Map<String, Value>> {
    if !value["metadata"].is_object() {
        value["metadata"] = json!({});
    }
    value.get_mut("metadata").and_then(Value::as_object_mut)
}

fn finalizers_empty(value: &Value) -> bool {
    value["metadata"]["finalizers"]
        .as_array()
        .is_none_or(Vec::is_empty)
}

fn resource_version(value: &Value) -> Option<&str> {
    value["metadata"]["resourceVersion"]
        .as_str()
        .filter(|rv| !rv.is_empty())
}

impl MockStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object as-is, status included (for test setup)
    ///
    /// Fills in `resourceVersion`, `uid`, `creationTimestamp` and
    /// `generation` when missing. Returns the stored object.
    pub fn insert<K: StoreObject>(&self, obj: &K) -> K {
        let mut state = self.lock();
        let Some(key) = ObjectKey::from_resource(obj) else {
            return obj.clone();
        };
        let mut value = match serde_json::to_value(obj) {
            Ok(value) => value,
            Err(_) => return obj.clone(),
        };
        state.next_version += 1;
        let version = state.next_version;
        if let Some(meta) = metadata(&mut value) {
            meta.insert("resourceVersion".to_string(), json!(version.to_string()));
            meta.entry("uid").or_insert_with(|| json!(uuid::Uuid::new_v4().to_string()));
            meta.entry("creationTimestamp").or_insert_with(|| json!(now()));
            meta.entry("generation").or_insert(json!(1));
        }
        let stored = serde_json::from_value(value.clone()).unwrap_or_else(|_| obj.clone());
        state
            .objects
            .insert(storage_key(&K::api_version(&()), &K::kind(&()), &key), value);
        stored
    }

    /// Fetch without recording an action (for assertions)
    #[must_use]
    pub fn peek<K: StoreObject>(&self, key: &ObjectKey) -> Option<K> {
        let state = self.lock();
        state
            .objects
            .get(&storage_key(&K::api_version(&()), &K::kind(&()), key))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// All stored objects of a kind (for assertions)
    #[must_use]
    pub fn all<K: StoreObject>(&self) -> Vec<K> {
        let state = self.lock();
        let prefix = type_prefix(&K::api_version(&()), &K::kind(&()));
        state
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(_, v)| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// Fail the next call of `verb` against `kind`
    ///
    /// Failures queue up; each one is consumed by a single matching call.
    pub fn fail_next(&self, verb: Verb, kind: &str, failure: Failure) {
        self.lock().failures.push((verb, kind.to_string(), failure));
    }

    /// Number of write calls (create/update/patch/update_status/delete) so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().actions.iter().filter(|a| a.verb.is_write()).count()
    }

    /// Every call made so far, in order
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    /// Calls of one verb, as `Kind namespace/name`
    #[must_use]
    pub fn calls(&self, verb: Verb) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter(|a| a.verb == verb)
            .map(|a| format!("{} {}", a.kind, a.key))
            .collect()
    }

    /// Forget recorded actions
    pub fn clear_actions(&self) {
        self.lock().actions.clear();
    }

    fn record(state: &mut State, verb: Verb, kind: &str, key: &ObjectKey) -> Result<(), StoreError> {
        state.actions.push(Action {
            verb,
            kind: kind.to_string(),
            key: key.to_string(),
        });
        if let Some(pos) = state
            .failures
            .iter()
            .position(|(v, k, _)| *v == verb && k == kind)
        {
            let (_, _, failure) = state.failures.remove(pos);
            return Err(match failure {
                Failure::Conflict => StoreError::conflict(kind, key),
                Failure::Api(message) => StoreError::Api(message),
            });
        }
        Ok(())
    }

    fn bump(state: &mut State, value: &mut Value) {
        state.next_version += 1;
        let version = state.next_version.to_string();
        if let Some(meta) = metadata(value) {
            meta.insert("resourceVersion".to_string(), json!(version));
        }
    }

    fn key_of<K: StoreObject>(obj: &K) -> Result<ObjectKey, StoreError> {
        ObjectKey::from_resource(obj)
            .ok_or_else(|| StoreError::InvalidObject(format!("{} without a name", K::kind(&()))))
    }

    /// Store `value` at `skey`, or drop it if it is terminating with no
    /// finalizers left
    fn commit(state: &mut State, skey: String, value: Value) -> Value {
        let terminating = value["metadata"]["deletionTimestamp"].is_string();
        if terminating && finalizers_empty(&value) {
            state.objects.remove(&skey);
        } else {
            state.objects.insert(skey, value.clone());
        }
        value
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        let mut state = self.lock();
        Self::record(&mut state, Verb::Get, &K::kind(&()), key)?;
        state
            .objects
            .get(&storage_key(&K::api_version(&()), &K::kind(&()), key))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let mut state = self.lock();
        let all = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: "*".to_string(),
        };
        Self::record(&mut state, Verb::List, &K::kind(&()), &all)?;
        let prefix = type_prefix(&K::api_version(&()), &K::kind(&()));
        state
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .filter(|(_, v)| namespace.is_none_or(|ns| v["metadata"]["namespace"].as_str() == Some(ns)))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = Self::key_of(obj)?;
        let kind = K::kind(&());
        let mut state = self.lock();
        Self::record(&mut state, Verb::Create, &kind, &key)?;
        let skey = storage_key(&K::api_version(&()), &kind, &key);
        if state.objects.contains_key(&skey) {
            return Err(StoreError::conflict(&kind, &key));
        }
        let mut value = serde_json::to_value(obj)?;
        if let Value::Object(map) = &mut value {
            map.remove("status");
        }
        if let Some(meta) = metadata(&mut value) {
            meta.insert("uid".to_string(), json!(uuid::Uuid::new_v4().to_string()));
            meta.insert("creationTimestamp".to_string(), json!(now()));
            meta.insert("generation".to_string(), json!(1));
            meta.remove("deletionTimestamp");
        }
        Self::bump(&mut state, &mut value);
        state.objects.insert(skey, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = Self::key_of(obj)?;
        let kind = K::kind(&());
        let mut state = self.lock();
        Self::record(&mut state, Verb::Update, &kind, &key)?;
        let skey = storage_key(&K::api_version(&()), &kind, &key);
        let Some(current) = state.objects.get(&skey).cloned() else {
            return Err(StoreError::not_found(&kind, &key));
        };
        let mut value = serde_json::to_value(obj)?;
        if let Some(rv) = resource_version(&value)
            && Some(rv) != resource_version(&current)
        {
            return Err(StoreError::conflict(&kind, &key));
        }

        // status and server-owned metadata come from the stored copy
        if let Value::Object(map) = &mut value {
            match current.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }
        let generation = current["metadata"]["generation"].as_i64().unwrap_or(1);
        let spec_changed = value.get("spec") != current.get("spec");
        if let Some(meta) = metadata(&mut value) {
            for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
                match current["metadata"].get(field) {
                    Some(v) => meta.insert(field.to_string(), v.clone()),
                    None => meta.remove(field),
                };
            }
            meta.insert(
                "generation".to_string(),
                json!(if spec_changed { generation + 1 } else { generation }),
            );
        }
        Self::bump(&mut state, &mut value);
        let value = Self::commit(&mut state, skey, value);
        Ok(serde_json::from_value(value)?)
    }

    async fn patch<K: StoreObject>(
        &self,
        key: &ObjectKey,
        patch: &Value,
    ) -> Result<K, StoreError> {
        let kind = K::kind(&());
        let mut state = self.lock();
        Self::record(&mut state, Verb::Patch, &kind, key)?;
        let skey = storage_key(&K::api_version(&()), &kind, key);
        let Some(current) = state.objects.get(&skey).cloned() else {
            return Err(StoreError::not_found(&kind, key));
        };
        let mut patch = patch.clone();
        if let Value::Object(map) = &mut patch {
            map.remove("status");
        }
        let mut value = current.clone();
        apply_merge_patch(&mut value, &patch);
        if value.get("spec") != current.get("spec") {
            let generation = current["metadata"]["generation"].as_i64().unwrap_or(1);
            if let Some(meta) = metadata(&mut value) {
                meta.insert("generation".to_string(), json!(generation + 1));
            }
        }
        Self::bump(&mut state, &mut value);
        let value = Self::commit(&mut state, skey, value);
        Ok(serde_json::from_value(value)?)
    }

    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = Self::key_of(obj)?;
        let kind = K::kind(&());
        let mut state = self.lock();
        Self::record(&mut state, Verb::UpdateStatus, &kind, &key)?;
        let skey = storage_key(&K::api_version(&()), &kind, &key);
        let Some(mut value) = state.objects.get(&skey).cloned() else {
            return Err(StoreError::not_found(&kind, &key));
        };
        let incoming = serde_json::to_value(obj)?;
        if let Some(rv) = resource_version(&incoming)
            && Some(rv) != resource_version(&value)
        {
            return Err(StoreError::conflict(&kind, &key));
        }
        if let Value::Object(map) = &mut value {
            match incoming.get("status") {
                Some(status) if !status.is_null() => map.insert("status".to_string(), status.clone()),
                _ => map.remove("status"),
            };
        }
        Self::bump(&mut state, &mut value);
        state.objects.insert(skey, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<DeleteOutcome, StoreError> {
        let kind = K::kind(&());
        let mut state = self.lock();
        Self::record(&mut state, Verb::Delete, &kind, key)?;
        let skey = storage_key(&K::api_version(&()), &kind, key);
        let Some(mut value) = state.objects.get(&skey).cloned() else {
            return Ok(DeleteOutcome::NotFound);
        };

        if !finalizers_empty(&value) {
            if !value["metadata"]["deletionTimestamp"].is_string() {
                if let Some(meta) = metadata(&mut value) {
                    meta.insert("deletionTimestamp".to_string(), json!(now()));
                }
                Self::bump(&mut state, &mut value);
                state.objects.insert(skey, value);
            }
            return Ok(DeleteOutcome::Deleted);
        }

        state.objects.remove(&skey);
        if kind == "Namespace" && K::api_version(&()) == "v1" {
            let name = key.name.clone();
            state
                .objects
                .retain(|_, v| v["metadata"]["namespace"].as_str() != Some(name.as_str()));
        }
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
    use kube::api::ObjectMeta;

    fn config_map(ns: &str, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let store = MockStore::new();
        let created = store.create(&config_map("ns", "cm")).await.unwrap();

        let mut first = created.clone();
        first.data = Some([("a".to_string(), "1".to_string())].into());
        store.update(&first).await.unwrap();

        let mut stale = created;
        stale.data = Some([("a".to_string(), "2".to_string())].into());
        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_finalizer_holds_deletion() {
        let store = MockStore::new();
        let mut cm = config_map("ns", "held");
        cm.metadata.finalizers = Some(vec!["example.com/hold".to_string()]);
        store.create(&cm).await.unwrap();
        let key = ObjectKey::namespaced("ns", "held");

        assert_eq!(store.delete::<ConfigMap>(&key).await.unwrap(), DeleteOutcome::Deleted);
        let mut terminating: ConfigMap = store.get(&key).await.unwrap().unwrap();
        assert!(terminating.metadata.deletion_timestamp.is_some());

        terminating.metadata.finalizers = Some(Vec::new());
        store.update(&terminating).await.unwrap();
        assert!(store.get::<ConfigMap>(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_namespace_delete_cascades() {
        let store = MockStore::new();
        store.insert(&Namespace {
            metadata: ObjectMeta {
                name: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        store.create(&config_map("ns", "a")).await.unwrap();
        store.create(&config_map("other", "b")).await.unwrap();

        store.delete::<Namespace>(&ObjectKey::cluster("ns")).await.unwrap();

        assert!(store.all::<ConfigMap>().iter().all(|cm| cm.metadata.namespace.as_deref() == Some("other")));
        assert_eq!(
            store.delete::<Namespace>(&ObjectKey::cluster("ns")).await.unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_reads_are_not_writes() {
        let store = MockStore::new();
        store.get::<Secret>(&ObjectKey::namespaced("ns", "s")).await.unwrap();
        store.list::<Secret>(Some("ns")).await.unwrap();
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.actions().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_consumed_once() {
        let store = MockStore::new();
        store.fail_next(Verb::Create, "ConfigMap", Failure::Api("boom".to_string()));

        assert!(store.create(&config_map("ns", "cm")).await.is_err());
        assert!(store.create(&config_map("ns", "cm")).await.is_ok());
    }
}
