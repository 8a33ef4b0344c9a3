//! Reconciliation of HostedClusters.
//!
//! One pass per key, fully derived from what the store holds right now:
//! - `status`: aggregate rollout state and health conditions
//! - `deletion`: ordered teardown behind the finalizer
//! - `converge`: bring every dependent in line with the spec
//!
//! `credentials`, `control_plane`, `components` and `ignition` hold the
//! individual converge steps.

mod components;
mod control_plane;
mod converge;
mod credentials;
mod deletion;
mod ignition;
mod status;

#[cfg(test)]
mod converge_test;

use std::sync::Arc;
use std::time::Duration;

use crds::conditions::{reasons, types};
use crds::{Condition, ConditionStatus, HostedCluster, set_status_condition};
use object_store::{ObjectKey, ObjectStore, OperationResult, StoreObject, create_or_patch, create_or_update};
use tracing::{debug, info, warn};

use crate::builders::{DefaultBuilders, ResourceBuilders};
use crate::clock::{Clock, SystemClock};
use crate::config::{ComponentImages, ControllerConfig};
use crate::error::{ControllerError, ErrorClass, ResultExt};
use crate::manifests::{FINALIZER, annotate_owner};

/// Settings the reconciler needs from the controller configuration
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Component images
    pub images: ComponentImages,
    /// Recheck interval while teardown is in progress
    pub deletion_requeue: Duration,
    /// Retry delay after losing an optimistic concurrency race
    pub conflict_requeue: Duration,
}

impl ReconcilerSettings {
    /// Derive from the controller configuration
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            images: config.images.clone(),
            deletion_requeue: config.deletion_requeue,
            conflict_requeue: Duration::from_secs(1),
        }
    }
}

/// What the caller should do after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged, or waiting for an external change
    Done,
    /// Run again after the delay
    Requeue(Duration),
}

/// Reconciles HostedClusters against an object store
pub struct Reconciler<S: ObjectStore> {
    pub(crate) store: S,
    pub(crate) builders: Arc<dyn ResourceBuilders>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: ReconcilerSettings,
}

impl<S: ObjectStore> Reconciler<S> {
    /// Create a reconciler with the default builders and the wall clock
    pub fn new(store: S, settings: ReconcilerSettings) -> Self {
        Self {
            store,
            builders: Arc::new(DefaultBuilders),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the builder table
    #[must_use]
    pub fn with_builders(mut self, builders: Arc<dyn ResourceBuilders>) -> Self {
        self.builders = builders;
        self
    }

    /// Key of a HostedCluster; it must be named and namespaced
    pub(crate) fn cluster_key(hc: &HostedCluster) -> Result<ObjectKey, ControllerError> {
        ObjectKey::from_resource(hc)
            .filter(|key| key.namespace.is_some())
            .ok_or_else(|| ControllerError::Build("HostedCluster without name or namespace".to_string()))
    }

    /// Create-or-update a dependent of `owner`, stamping the back-reference
    pub(crate) async fn sync<K, F>(
        &self,
        owner: &ObjectKey,
        key: &ObjectKey,
        mut mutate: F,
    ) -> Result<(K, OperationResult), ControllerError>
    where
        K: StoreObject,
        F: FnMut(&mut K) -> Result<(), ControllerError> + Send,
    {
        let kind = K::kind(&());
        let (obj, result) = create_or_update(&self.store, key, |obj: &mut K| {
            mutate(obj)?;
            annotate_owner(obj, owner);
            Ok::<_, ControllerError>(())
        })
        .await
        .with_context(|| format!("sync {kind} {key} for HostedCluster {owner}"))?;
        debug!("HostedCluster {}: {} {} {}", owner, kind, key, result);
        Ok((obj, result))
    }

    /// Create-or-update without a back-reference (shared objects)
    pub(crate) async fn sync_unowned<K, F>(
        &self,
        key: &ObjectKey,
        mutate: F,
    ) -> Result<(K, OperationResult), ControllerError>
    where
        K: StoreObject,
        F: FnMut(&mut K) -> Result<(), ControllerError> + Send,
    {
        let kind = K::kind(&());
        let (obj, result) = create_or_update(&self.store, key, mutate)
            .await
            .with_context(|| format!("sync {kind} {key}"))?;
        debug!("{} {} {}", kind, key, result);
        Ok((obj, result))
    }

    /// Create-or-patch a dependent of `owner`, touching only the fields set by `mutate`
    pub(crate) async fn sync_patch<K, F>(
        &self,
        owner: &ObjectKey,
        key: &ObjectKey,
        mut mutate: F,
    ) -> Result<(K, OperationResult), ControllerError>
    where
        K: StoreObject,
        F: FnMut(&mut K) -> Result<(), ControllerError> + Send,
    {
        let kind = K::kind(&());
        let (obj, result) = create_or_patch(&self.store, key, |obj: &mut K| {
            mutate(obj)?;
            annotate_owner(obj, owner);
            Ok::<_, ControllerError>(())
        })
        .await
        .with_context(|| format!("patch {kind} {key} for HostedCluster {owner}"))?;
        debug!("HostedCluster {}: {} {} {}", owner, kind, key, result);
        Ok((obj, result))
    }

    /// Reconcile one HostedCluster
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ControllerError> {
        let Some(hc) = self.store.get::<HostedCluster>(key).await? else {
            info!("HostedCluster {} not found, cleaning up leftovers", key);
            return Ok(if self.delete_cluster(key, None).await? {
                ReconcileOutcome::Done
            } else {
                ReconcileOutcome::Requeue(self.settings.deletion_requeue)
            });
        };

        let report = self.aggregate_status(&hc).await?;
        let Some(hc) = self.write_status(hc, report.status).await? else {
            return Ok(ReconcileOutcome::Requeue(self.settings.conflict_requeue));
        };

        if hc.metadata.deletion_timestamp.is_some() {
            if !self.delete_cluster(key, Some(&hc)).await? {
                info!("HostedCluster {}: teardown in progress", key);
                return Ok(ReconcileOutcome::Requeue(self.settings.deletion_requeue));
            }
            return self.remove_finalizer(hc).await;
        }

        if let Some(err) = report.config_error {
            warn!("HostedCluster {}: {}", key, err);
            self.record_reconciliation(hc, Some(&err)).await?;
            return Ok(ReconcileOutcome::Done);
        }

        let Some(hc) = self.ensure_finalizer(hc).await? else {
            return Ok(ReconcileOutcome::Requeue(self.settings.conflict_requeue));
        };

        match self.converge(&hc).await {
            Ok(()) => {
                self.record_reconciliation(hc, None).await?;
                Ok(ReconcileOutcome::Done)
            }
            Err(err) if err.class() == ErrorClass::Configuration => {
                warn!("HostedCluster {}: {}", key, err);
                self.record_reconciliation(hc, Some(&err)).await?;
                Ok(ReconcileOutcome::Done)
            }
            Err(err) if err.is_conflict() => {
                debug!("HostedCluster {}: {}, requeueing", key, err);
                Ok(ReconcileOutcome::Requeue(self.settings.conflict_requeue))
            }
            Err(err) => Err(err),
        }
    }

    /// Add the finalizer; `None` when the update lost a race
    async fn ensure_finalizer(&self, hc: HostedCluster) -> Result<Option<HostedCluster>, ControllerError> {
        if hc.metadata.finalizers.iter().flatten().any(|f| f == FINALIZER) {
            return Ok(Some(hc));
        }
        let mut updated = hc;
        updated
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(FINALIZER.to_string());
        match self.store.update(&updated).await {
            Ok(written) => {
                info!("HostedCluster {}: finalizer added", Self::cluster_key(&written)?);
                Ok(Some(written))
            }
            Err(e) if e.is_conflict() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_finalizer(&self, hc: HostedCluster) -> Result<ReconcileOutcome, ControllerError> {
        let key = Self::cluster_key(&hc)?;
        if !hc.metadata.finalizers.iter().flatten().any(|f| f == FINALIZER) {
            return Ok(ReconcileOutcome::Done);
        }
        let mut updated = hc;
        if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != FINALIZER);
        }
        match self.store.update(&updated).await {
            Ok(_) => {
                info!("HostedCluster {}: teardown complete, finalizer removed", key);
                Ok(ReconcileOutcome::Done)
            }
            Err(e) if e.is_conflict() => Ok(ReconcileOutcome::Requeue(self.settings.conflict_requeue)),
            Err(e) if e.is_not_found() => Ok(ReconcileOutcome::Done),
            Err(e) => Err(e.into()),
        }
    }

    /// Record the outcome of a converge pass as the ReconciliationSucceeded condition
    async fn record_reconciliation(
        &self,
        hc: HostedCluster,
        error: Option<&ControllerError>,
    ) -> Result<(), ControllerError> {
        let condition = match error {
            None => Condition::new(
                types::RECONCILIATION_SUCCEEDED,
                ConditionStatus::True,
                reasons::RECONCILIATION_SUCCEEDED,
            ),
            Some(err) => Condition::new(
                types::RECONCILIATION_SUCCEEDED,
                ConditionStatus::False,
                reasons::INVALID_CONFIGURATION,
            )
            .with_message(err.to_string()),
        }
        .with_generation(hc.metadata.generation);

        let mut status = hc.status.clone().unwrap_or_default();
        set_status_condition(&mut status.conditions, condition, self.clock.now());
        // a lost race only delays the condition until the next pass
        self.write_status(hc, status).await.map(|_| ())
    }
}
