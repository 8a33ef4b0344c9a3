//! Status conditions
//!
//! One live `Condition` per type. Writers go through
//! [`set_status_condition`], which inserts or updates by type and only moves
//! `lastTransitionTime` when the status value actually flips, so recomputing
//! an unchanged condition leaves the status block byte-for-byte identical.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types reported on a HostedCluster
pub mod types {
    /// Aggregate availability of the hosted cluster
    pub const HOSTED_CLUSTER_AVAILABLE: &str = "Available";
    /// Mirrors the control plane's own configuration verdict
    pub const VALID_HOSTED_CLUSTER_CONFIGURATION: &str = "ValidConfiguration";
    /// Ignition delivery deployment availability
    pub const IGNITION_ENDPOINT_AVAILABLE: &str = "IgnitionEndpointAvailable";
    /// Unmanaged etcd client TLS secret validation
    pub const UNMANAGED_ETCD_AVAILABLE: &str = "UnmanagedEtcdAvailable";
    /// Outcome of the last converge pass
    pub const RECONCILIATION_SUCCEEDED: &str = "ReconciliationSucceeded";

    /// HostedControlPlane availability (reported by the control plane operator)
    pub const HOSTED_CONTROL_PLANE_AVAILABLE: &str = "Available";
    /// HostedControlPlane configuration verdict (reported by the control plane operator)
    pub const VALID_CONFIGURATION: &str = "ValidConfiguration";
}

/// Condition reasons
pub mod reasons {
    pub const HOSTED_CLUSTER_AS_EXPECTED: &str = "HostedClusterAsExpected";
    pub const UNHEALTHY_COMPONENTS: &str = "UnhealthyHostedControlPlaneComponents";
    pub const STATUS_UNKNOWN: &str = "StatusUnknown";

    pub const IGNITION_DEPLOYMENT_AS_EXPECTED: &str = "IgnitionServerDeploymentAsExpected";
    pub const IGNITION_DEPLOYMENT_NOT_FOUND: &str = "IgnitionServerDeploymentNotFound";
    pub const IGNITION_DEPLOYMENT_UNAVAILABLE: &str = "IgnitionServerDeploymentUnavailable";

    pub const UNMANAGED_ETCD_MISCONFIGURED: &str = "UnmanagedEtcdMisconfigured";
    pub const UNMANAGED_ETCD_AS_EXPECTED: &str = "UnmanagedEtcdAsExpected";

    pub const RECONCILIATION_SUCCEEDED: &str = "ReconciliationSucceeded";
    pub const INVALID_CONFIGURATION: &str = "InvalidConfiguration";
}

/// Tri-state condition status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Not yet determined
    #[default]
    Unknown,
}

/// A single typed status fact
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (one entry per type)
    pub r#type: String,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Machine-readable reason, CamelCase
    #[serde(default)]
    pub reason: String,

    /// Human-readable detail
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Generation of the owning object this condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the status value changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a condition with the given type, status and reason
    pub fn new(r#type: &str, status: ConditionStatus, reason: &str) -> Self {
        Self {
            r#type: r#type.to_string(),
            status,
            reason: reason.to_string(),
            ..Default::default()
        }
    }

    /// Attach a message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the observed generation
    #[must_use]
    pub fn with_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

/// Insert or update `new` in `conditions`, keyed by type.
///
/// `lastTransitionTime` is set to `now` on insert and whenever the status
/// value changes; otherwise the existing timestamp is preserved.
pub fn set_status_condition(conditions: &mut Vec<Condition>, new: Condition, now: DateTime<Utc>) {
    match conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        Some(existing) => {
            if existing.status != new.status {
                existing.status = new.status;
                existing.last_transition_time = Some(new.last_transition_time.unwrap_or(now));
            }
            existing.reason = new.reason;
            existing.message = new.message;
            existing.observed_generation = new.observed_generation;
        }
        None => {
            let mut new = new;
            if new.last_transition_time.is_none() {
                new.last_transition_time = Some(now);
            }
            conditions.push(new);
        }
    }
}

/// Find the condition of the given type
#[must_use]
pub fn find_status_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// True iff a condition of the given type exists with status `True`
#[must_use]
pub fn is_status_condition_true(conditions: &[Condition], r#type: &str) -> bool {
    find_status_condition(conditions, r#type).is_some_and(|c| c.status == ConditionStatus::True)
}
