//! Replication topology model

use chrono::{DateTime, Utc};
use geo_common::RegionName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of a region in the replication topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationRole {
    /// Accepts writes.
    Primary,
    /// Streams from the primary.
    Replica,
    /// Configured but not currently streaming.
    Standby,
}

/// Observed replication link status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStatus {
    /// Actively replaying the primary's stream.
    Streaming,
    /// Reconnected and replaying backlog.
    CatchUp,
    /// Not replicating; must re-synchronize.
    Stopped,
    /// No observation yet.
    Unknown,
}

/// Tracked replication state of one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationState {
    /// Region this state describes.
    pub region: RegionName,
    /// Current role.
    pub role: ReplicationRole,
    /// Current link status.
    pub status: ReplicationStatus,
    /// Last reported lag in seconds; 0 for the primary, `None` when unknown.
    pub lag_seconds: Option<f64>,
    /// The region this one replicates from, if any.
    pub primary_region: Option<RegionName>,
    /// When this state last changed.
    pub last_updated: DateTime<Utc>,
}

/// Read-only dump of the tracked topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Current primary, if configured.
    pub primary_region: Option<RegionName>,
    /// Currently tracked replicas.
    pub replicas: Vec<RegionName>,
    /// Per-region replication state.
    pub states: HashMap<RegionName, ReplicationState>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Outcome of a replica promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionResult {
    /// The region that was primary before the promotion.
    pub previous_primary: RegionName,
    /// The newly promoted primary.
    pub new_primary: RegionName,
    /// When the promotion completed locally.
    pub promoted_at: DateTime<Utc>,
}
