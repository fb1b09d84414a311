//! Failover records and status snapshots

use chrono::{DateTime, Utc};
use geo_common::RegionName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// State of one failover attempt.
///
/// `Detecting → InProgress → {Complete | Failed}`; a `Complete` record moves
/// to `RolledBack` when its failover is explicitly rolled back. The absence
/// of any record is the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    /// Failure confirmation in progress.
    Detecting,
    /// Promotion and directory updates running.
    InProgress,
    /// Failover finished; the target serves as primary.
    Complete,
    /// Promotion failed; topology unchanged beyond the failed region's status.
    Failed,
    /// A previously Complete failover was rolled back.
    RolledBack,
}

/// One failover attempt. Append-only history, mutated in place until a
/// terminal state, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRecord {
    /// Unique attempt id.
    pub id: Uuid,
    /// The region that failed.
    pub failed_region: RegionName,
    /// The region promoted in its place.
    pub target_region: RegionName,
    /// Current state of the attempt.
    pub state: FailoverState,
    /// `"auto"` or `"manual:<actor>"`.
    pub initiated_by: String,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message, present when the attempt failed.
    pub error_message: Option<String>,
    /// Free-form attempt metadata, e.g. the promotion result.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FailoverRecord {
    pub(crate) fn new(failed_region: &str, target_region: &str, initiated_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            failed_region: failed_region.to_string(),
            target_region: target_region.to_string(),
            state: FailoverState::Detecting,
            initiated_by: initiated_by.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            metadata: HashMap::new(),
        }
    }
}

/// Outcome of a rollback to a recovered region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    /// The region restored to primary.
    pub restored_primary: RegionName,
    /// The region that was demoted, if one held the primary flag.
    pub demoted_region: Option<RegionName>,
    /// The Complete record that moved to RolledBack, if one matched.
    pub rolled_back_record: Option<Uuid>,
    /// When the rollback finished.
    pub completed_at: DateTime<Utc>,
}

/// Point-in-time orchestrator status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverStatus {
    /// Whether a failover or rollback is currently running.
    pub active: bool,
    /// The record of the currently running failover, if any.
    pub active_record: Option<FailoverRecord>,
    /// The primary that was lost in the most recent failover, until rolled back.
    pub original_primary: Option<RegionName>,
    /// Per-region consecutive probe failures.
    pub failure_counts: HashMap<RegionName, u32>,
    /// Number of failover attempts ever recorded.
    pub total_failovers: usize,
    /// Full record history, newest first.
    pub history: Vec<FailoverRecord>,
}
