//! Release and rollout history types

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A release payload, identified by its pull spec
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release image pull spec
    pub image: String,
}

impl Release {
    /// Create a release for the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into() }
    }
}

/// Lifecycle state of a single rollout attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum UpdateState {
    /// Rollout requested, not yet observed on the control plane
    #[default]
    Partial,
    /// Control plane reported the requested image as deployed
    Completed,
}

/// One entry of the rollout audit trail
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHistory {
    /// Partial or Completed
    pub state: UpdateState,

    /// When the rollout was requested
    pub started_time: DateTime<Utc>,

    /// When the rollout completed (unset while Partial)
    pub completion_time: Option<DateTime<Utc>>,

    /// Version reported by the control plane once completed
    #[serde(default)]
    pub version: String,

    /// Requested release image
    pub image: String,

    /// Whether the release signature was verified
    #[serde(default)]
    pub verified: bool,
}

/// Version rollout status of a hosted cluster
///
/// `history` is ordered newest first. At most the head may be `Partial`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionStatus {
    /// Release the cluster is being driven towards
    pub desired: Release,

    /// Rollout history, newest first
    #[serde(default)]
    pub history: Vec<UpdateHistory>,

    /// Generation of the HostedCluster the desired release was taken from
    #[serde(default)]
    pub observed_generation: i64,
}

impl ClusterVersionStatus {
    /// Most recent rollout attempt
    #[must_use]
    pub fn head(&self) -> Option<&UpdateHistory> {
        self.history.first()
    }

    /// True when there is no rollout in flight
    #[must_use]
    pub fn head_completed(&self) -> bool {
        self.head().is_some_and(|h| h.state == UpdateState::Completed)
    }
}
