//! Create-or-update primitives
//!
//! Both primitives load the current object (or start from `Default`), run the
//! caller's mutate function, and write only when the serialized result
//! differs. A conflict on the write re-runs the whole get/mutate/write cycle
//! up to [`MAX_CONFLICT_RETRIES`] times before surfacing it.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::client::ensure_identity;
use crate::error::StoreError;
use crate::key::ObjectKey;
use crate::merge::diff_merge_patch;
use crate::store_trait::{ObjectStore, StoreObject};

/// Attempts made by the sync primitives before a conflict is returned
pub const MAX_CONFLICT_RETRIES: usize = 3;

/// What a sync primitive did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Object did not exist and was created
    Created,
    /// Object existed and was written
    Updated,
    /// Object existed and already matched
    Unchanged,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::Created => write!(f, "created"),
            OperationResult::Updated => write!(f, "updated"),
            OperationResult::Unchanged => write!(f, "unchanged"),
        }
    }
}

fn blank<K: StoreObject>(key: &ObjectKey) -> K {
    let mut obj = K::default();
    obj.meta_mut().name = Some(key.name.clone());
    obj.meta_mut().namespace = key.namespace.clone();
    obj
}

fn without_status(mut value: Value) -> (Value, Value) {
    let status = value
        .as_object_mut()
        .and_then(|m| m.remove("status"))
        .unwrap_or(Value::Null);
    (value, status)
}

fn with_status<K: StoreObject>(obj: &K, status: Value) -> Result<K, StoreError> {
    let mut value = serde_json::to_value(obj)?;
    if let Value::Object(map) = &mut value {
        map.insert("status".to_string(), status);
    }
    Ok(serde_json::from_value(value)?)
}

/// Get-or-create `key`, apply `mutate`, and replace the object if it changed
///
/// The whole object (including `resourceVersion`) is written back, so a
/// concurrent writer causes a conflict and a fresh attempt.
pub async fn create_or_update<S, K, E, F>(
    store: &S,
    key: &ObjectKey,
    mut mutate: F,
) -> Result<(K, OperationResult), E>
where
    S: ObjectStore + ?Sized,
    K: StoreObject,
    E: From<StoreError>,
    F: FnMut(&mut K) -> Result<(), E>,
{
    let kind = K::kind(&());
    let mut attempt = 0;
    loop {
        attempt += 1;
        let write = match store.get::<K>(key).await? {
            None => {
                let mut obj = blank::<K>(key);
                mutate(&mut obj)?;
                ensure_identity(&obj, key)?;
                store
                    .create(&obj)
                    .await
                    .map(|created| (created, OperationResult::Created))
            }
            Some(existing) => {
                let before = serde_json::to_value(&existing).map_err(StoreError::from)?;
                let mut obj = existing;
                mutate(&mut obj)?;
                ensure_identity(&obj, key)?;
                let after = serde_json::to_value(&obj).map_err(StoreError::from)?;
                if before == after {
                    debug!("{} {} unchanged", kind, key);
                    return Ok((obj, OperationResult::Unchanged));
                }
                store
                    .update(&obj)
                    .await
                    .map(|updated| (updated, OperationResult::Updated))
            }
        };

        match write {
            Ok((obj, result)) => {
                debug!("{} {} {}", kind, key, result);
                return Ok((obj, result));
            }
            Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                debug!("{} {} conflict on attempt {}, retrying", kind, key, attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Get-or-create `key`, apply `mutate`, and merge-patch only what changed
///
/// Non-status fields go out as a JSON merge patch of the difference, so
/// fields set by other writers and not touched by `mutate` are left alone.
/// A changed status block is written separately through the status
/// subresource.
pub async fn create_or_patch<S, K, E, F>(
    store: &S,
    key: &ObjectKey,
    mut mutate: F,
) -> Result<(K, OperationResult), E>
where
    S: ObjectStore + ?Sized,
    K: StoreObject,
    E: From<StoreError>,
    F: FnMut(&mut K) -> Result<(), E>,
{
    let kind = K::kind(&());
    let mut attempt = 0;
    loop {
        attempt += 1;
        let write = match store.get::<K>(key).await? {
            None => {
                let mut obj = blank::<K>(key);
                mutate(&mut obj)?;
                ensure_identity(&obj, key)?;
                let (_, desired_status) = without_status(serde_json::to_value(&obj).map_err(StoreError::from)?);
                create_then_status(store, &obj, desired_status)
                    .await
                    .map(|created| (created, OperationResult::Created))
            }
            Some(existing) => {
                let (before, before_status) =
                    without_status(serde_json::to_value(&existing).map_err(StoreError::from)?);
                let mut obj = existing;
                mutate(&mut obj)?;
                ensure_identity(&obj, key)?;
                let (after, after_status) =
                    without_status(serde_json::to_value(&obj).map_err(StoreError::from)?);

                let patch = diff_merge_patch(&before, &after);
                let status_changed = before_status != after_status;
                if patch.is_none() && !status_changed {
                    debug!("{} {} unchanged", kind, key);
                    return Ok((obj, OperationResult::Unchanged));
                }
                patch_then_status(store, key, &obj, patch, status_changed.then_some(after_status))
                    .await
                    .map(|patched| (patched, OperationResult::Updated))
            }
        };

        match write {
            Ok((obj, result)) => {
                debug!("{} {} {}", kind, key, result);
                return Ok((obj, result));
            }
            Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                debug!("{} {} conflict on attempt {}, retrying", kind, key, attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn create_then_status<S, K>(store: &S, obj: &K, desired_status: Value) -> Result<K, StoreError>
where
    S: ObjectStore + ?Sized,
    K: StoreObject,
{
    let created = store.create(obj).await?;
    let (_, created_status) = without_status(serde_json::to_value(&created)?);
    if desired_status.is_null() || desired_status == created_status {
        return Ok(created);
    }
    store.update_status(&with_status(&created, desired_status)?).await
}

async fn patch_then_status<S, K>(
    store: &S,
    key: &ObjectKey,
    obj: &K,
    patch: Option<Value>,
    status: Option<Value>,
) -> Result<K, StoreError>
where
    S: ObjectStore + ?Sized,
    K: StoreObject,
{
    let current = match patch {
        Some(patch) => store.patch::<K>(key, &patch).await?,
        None => obj.clone(),
    };
    match status {
        Some(status) => store.update_status(&with_status(&current, status)?).await,
        None => Ok(current),
    }
}
