//! OpenGeo Failover Orchestrator (OFO)
//!
//! Detects region failures, drives the failover state machine, and rolls
//! back to a recovered primary. Sits on top of the Region Directory and the
//! Replication Topology Tracker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    FAILOVER ORCHESTRATOR                     │
//! │                                                              │
//! │   detect_failure ──▶ trigger_failover ──▶ rollback_failover  │
//! │   (N sequential      (promote replica,     (restore the      │
//! │    probes, anti-      flip directory       recovered         │
//! │    flap)              primary flags)       primary)          │
//! │                                                              │
//! │        single in-process exclusion flag, not a               │
//! │        distributed lock: one instance per deployment         │
//! └──────────────┬───────────────────────────┬──────────────────┘
//!                ▼                           ▼
//!        Region Directory        Replication Topology Tracker
//! ```

#![warn(missing_docs)]

pub mod orchestrator;
pub mod record;

pub use orchestrator::{FailoverConfig, FailoverOrchestrator};
pub use record::{FailoverRecord, FailoverState, FailoverStatus, RollbackResult};

use geo_common::RegionName;
use geo_directory::{DirectoryConfig, DirectoryError, RegionDirectory};
use geo_replication::{ReplicationConfig, ReplicationError, ReplicationTracker};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failover orchestrator errors
#[derive(Debug, Error)]
pub enum FailoverError {
    /// Another failover or rollback holds the exclusion flag; retry later.
    #[error("failover already in progress")]
    FailoverInProgress,

    /// Referenced region is not registered in the directory.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// Rollback target has not recovered yet.
    #[error("region still unavailable: {0}")]
    RegionStillUnavailable(String),

    /// Replica promotion failed; the failover did not complete.
    #[error("promotion failed: {0}")]
    Promotion(#[from] ReplicationError),

    /// Directory update failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Result type for failover operations.
pub type Result<T> = std::result::Result<T, FailoverError>;

/// Configuration for a full multi-region fabric.
#[derive(Debug, Clone, Default)]
pub struct FabricConfig {
    /// Region Directory settings.
    pub directory: DirectoryConfig,
    /// Replication tracker settings.
    pub replication: ReplicationConfig,
    /// Failover orchestrator settings.
    pub failover: FailoverConfig,
}

/// The assembled multi-region control plane: directory, replication
/// tracker, and failover orchestrator wired together.
pub struct RegionFabric {
    /// Region catalog and routing.
    pub directory: Arc<RegionDirectory>,
    /// Replication topology tracker.
    pub replication: Arc<ReplicationTracker>,
    /// Failover orchestrator.
    pub failover: Arc<FailoverOrchestrator>,
}

impl RegionFabric {
    /// Build a fabric from one configuration.
    pub fn new(config: FabricConfig) -> Self {
        let directory = Arc::new(RegionDirectory::new(config.directory));
        let replication = Arc::new(ReplicationTracker::new(config.replication));
        let failover = Arc::new(FailoverOrchestrator::new(
            directory.clone(),
            replication.clone(),
            config.failover,
        ));
        Self {
            directory,
            replication,
            failover,
        }
    }

    /// Spawn the auto-detection loop onto the runtime.
    pub fn spawn_auto_detection(
        &self,
        watch_list: Vec<RegionName>,
        preferred_targets: HashMap<RegionName, RegionName>,
    ) -> tokio::task::JoinHandle<()> {
        let orchestrator = self.failover.clone();
        tokio::spawn(async move {
            orchestrator.run_auto_detection(watch_list, preferred_targets).await;
        })
    }
}

impl Default for RegionFabric {
    fn default() -> Self {
        Self::new(FabricConfig::default())
    }
}
