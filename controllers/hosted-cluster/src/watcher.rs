//! Kubernetes resource watchers.
//!
//! HostedClusters drive reconciliation through `kube_runtime::Controller`.
//! Dependents carry a back-reference annotation instead of an owner
//! reference (they live in another namespace), so their events are mapped
//! back to the HostedCluster through that annotation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crds::{Cluster, HostedCluster, HostedControlPlane, NodePool};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::{Api, Client, Resource};
use kube_runtime::controller::{Action, Config as RuntimeConfig, Error as RuntimeError};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use object_store::{ObjectKey, ObjectStore};
use tracing::{debug, error, info, warn};

use crate::backoff::ExponentialBackoff;
use crate::error::{ControllerError, ErrorClass};
use crate::manifests::owner_of;
use crate::metrics::{Metrics, outcomes};
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Backoff bounds for transient failures, in seconds
const BACKOFF_MIN_SECS: u64 = 1;
const BACKOFF_MAX_SECS: u64 = 10;

/// Transient failures tolerated by a teardown with no HostedCluster left
const CLEANUP_MAX_RETRIES: u32 = 10;

/// Shared state handed to every reconcile
pub struct Context<S: ObjectStore> {
    pub reconciler: Reconciler<S>,
    pub metrics: Arc<Metrics>,
    pub reconcile_timeout: Duration,
    pub resync_interval: Duration,
    backoff: Mutex<HashMap<String, ExponentialBackoff>>,
    cleanups: Mutex<HashSet<String>>,
}

/// Marks a key as being torn down for as long as it lives
struct CleanupGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    key: String,
}

impl<'a> CleanupGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, key: &ObjectKey) -> Option<Self> {
        let key = key.to_string();
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then_some(Self { in_flight, key })
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<S: ObjectStore> Context<S> {
    pub fn new(
        reconciler: Reconciler<S>,
        metrics: Arc<Metrics>,
        reconcile_timeout: Duration,
        resync_interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            metrics,
            reconcile_timeout,
            resync_interval,
            backoff: Mutex::new(HashMap::new()),
            cleanups: Mutex::new(HashSet::new()),
        }
    }

    /// One bounded reconcile pass for `key`, translated into a requeue action
    pub async fn run(&self, key: &ObjectKey) -> Result<Action, ControllerError> {
        match self.pass(key).await? {
            ReconcileOutcome::Done => Ok(Action::requeue(self.resync_interval)),
            ReconcileOutcome::Requeue(delay) => Ok(Action::requeue(delay)),
        }
    }

    /// Tear down a HostedCluster that is already gone from the cache
    ///
    /// kube-runtime never schedules a key without a cached object, so the
    /// passes are repeated here until teardown reports done. Only one
    /// cleanup per key runs at a time; returns `false` when another one
    /// already owns `key`.
    pub async fn cleanup(&self, key: &ObjectKey) -> bool {
        let Some(_guard) = CleanupGuard::acquire(&self.cleanups, key) else {
            debug!("Cleanup of HostedCluster {} already running", key);
            return false;
        };

        let mut failures = 0;
        loop {
            match self.pass(key).await {
                Ok(ReconcileOutcome::Done) => {
                    info!("Cleanup of HostedCluster {} finished", key);
                    break;
                }
                Ok(ReconcileOutcome::Requeue(delay)) => tokio::time::sleep(delay).await,
                Err(err) if err.class() == ErrorClass::Transient && failures < CLEANUP_MAX_RETRIES => {
                    failures += 1;
                    let delay = self.next_backoff(&key.to_string());
                    warn!("Cleanup of HostedCluster {}: {}, retrying in {:?}", key, err, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!("Cleanup of HostedCluster {} abandoned: {}", key, err);
                    break;
                }
            }
        }
        self.reset_backoff(key);
        true
    }

    /// Run the reconciler under the timeout and record the outcome
    async fn pass(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ControllerError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.reconcile_timeout, self.reconciler.reconcile(key))
            .await
            .unwrap_or(Err(ControllerError::Timeout(self.reconcile_timeout)));
        let elapsed = started.elapsed();

        match result {
            Ok(outcome) => {
                // any successful pass ends a run of failures
                self.reset_backoff(key);
                match outcome {
                    ReconcileOutcome::Done => {
                        self.metrics.observe(outcomes::SUCCESS, elapsed);
                        debug!("HostedCluster {} reconciled in {:?}", key, elapsed);
                    }
                    ReconcileOutcome::Requeue(_) => self.metrics.observe(outcomes::REQUEUE, elapsed),
                }
                Ok(outcome)
            }
            Err(err) => {
                let outcome = if matches!(err, ControllerError::Timeout(_)) {
                    outcomes::TIMEOUT
                } else {
                    outcomes::ERROR
                };
                self.metrics.observe(outcome, elapsed);
                self.metrics.observe_failure(err.class());
                Err(err)
            }
        }
    }

    /// Next retry delay for `key`
    fn next_backoff(&self, key: &str) -> Duration {
        let mut backoff = self.backoff.lock().unwrap_or_else(PoisonError::into_inner);
        backoff
            .entry(key.to_string())
            .or_insert_with(|| ExponentialBackoff::new(BACKOFF_MIN_SECS, BACKOFF_MAX_SECS))
            .next_backoff()
    }

    fn reset_backoff(&self, key: &ObjectKey) {
        self.backoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.to_string());
    }

    #[cfg(test)]
    fn tracked_backoffs(&self) -> usize {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

async fn reconcile<S: ObjectStore + 'static>(
    hc: Arc<HostedCluster>,
    ctx: Arc<Context<S>>,
) -> Result<Action, ControllerError> {
    let key = ObjectKey::from_resource(hc.as_ref())
        .ok_or_else(|| ControllerError::Build("HostedCluster without a name".to_string()))?;
    ctx.run(&key).await
}

fn error_policy<S: ObjectStore + 'static>(
    hc: Arc<HostedCluster>,
    err: &ControllerError,
    ctx: Arc<Context<S>>,
) -> Action {
    let key = ObjectKey::from_resource(hc.as_ref()).map_or_else(|| "<unnamed>".to_string(), |k| k.to_string());
    match err.class() {
        ErrorClass::Transient => {
            let delay = ctx.next_backoff(&key);
            warn!("HostedCluster {}: {}, retrying in {:?}", key, err, delay);
            Action::requeue(delay)
        }
        ErrorClass::Configuration => {
            warn!("HostedCluster {}: {}, waiting for a spec change", key, err);
            Action::await_change()
        }
        ErrorClass::Fatal => {
            error!("HostedCluster {}: {}", key, err);
            Action::requeue(ctx.resync_interval)
        }
    }
}

/// Map a dependent to the HostedCluster named by its back-reference
fn owning_cluster<K: Resource>(obj: K) -> Option<ObjectRef<HostedCluster>> {
    let key = owner_of(&obj)?;
    let namespace = key.namespace?;
    Some(ObjectRef::new(&key.name).within(&namespace))
}

/// Map a NodePool to the HostedCluster it belongs to
fn node_pool_cluster(np: NodePool) -> Option<ObjectRef<HostedCluster>> {
    let namespace = np.metadata.namespace?;
    Some(ObjectRef::new(&np.spec.cluster_name).within(&namespace))
}

/// Watches HostedClusters and their dependents
pub struct Watcher<S: ObjectStore + 'static> {
    ctx: Arc<Context<S>>,
    client: Client,
    namespace: Option<String>,
}

impl<S: ObjectStore + 'static> Watcher<S> {
    pub fn new(ctx: Arc<Context<S>>, client: Client, namespace: Option<String>) -> Self {
        Self { ctx, client, namespace }
    }

    fn hosted_clusters(&self) -> Api<HostedCluster> {
        match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Fail early when the HostedCluster API cannot be listed
    pub async fn check_access(&self) -> Result<(), ControllerError> {
        self.hosted_clusters()
            .list(&kube::api::ListParams::default().limit(1))
            .await
            .map_err(|e| ControllerError::Watch(format!("cannot list HostedClusters: {e}")))?;
        Ok(())
    }

    /// Run the HostedCluster controller until shutdown
    pub async fn watch_hosted_clusters(&self) -> Result<(), ControllerError> {
        info!("Starting HostedCluster watcher");

        // Debounce batches bursts of dependent events into one pass
        let runtime_config = RuntimeConfig::default().debounce(Duration::from_secs(1)).concurrency(5);
        let client = self.client.clone();
        let cleanup_ctx = self.ctx.clone();

        Controller::new(self.hosted_clusters(), watcher::Config::default())
            .with_config(runtime_config)
            .watches(
                Api::<HostedControlPlane>::all(client.clone()),
                watcher::Config::default(),
                owning_cluster,
            )
            .watches(Api::<Deployment>::all(client.clone()), watcher::Config::default(), owning_cluster)
            .watches(Api::<Service>::all(client.clone()), watcher::Config::default(), owning_cluster)
            .watches(Api::<Secret>::all(client.clone()), watcher::Config::default(), owning_cluster)
            .watches(Api::<Cluster>::all(client.clone()), watcher::Config::default(), owning_cluster)
            .watches(Api::<NodePool>::all(client), watcher::Config::default(), node_pool_cluster)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.ctx.clone())
            .for_each(move |res| {
                let ctx = cleanup_ctx.clone();
                async move {
                    match res {
                        Ok((obj, action)) => debug!("HostedCluster {} reconciled: {:?}", obj, action),
                        // a dependent outlived its HostedCluster
                        Err(RuntimeError::ObjectNotFound(obj)) => {
                            let key = ObjectKey {
                                namespace: obj.namespace.clone(),
                                name: obj.name.clone(),
                            };
                            tokio::spawn(async move { ctx.cleanup(&key).await });
                        }
                        Err(RuntimeError::ReconcilerFailed(..)) => {}
                        Err(e) => error!("HostedCluster controller error: {}", e),
                    }
                }
            })
            .await;

        info!("HostedCluster watcher stopped");
        Ok(())
    }
}
