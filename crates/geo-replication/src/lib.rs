//! OpenGeo Replication Topology Tracker (RTT)
//!
//! Tracks which region is the database primary and which are replicas,
//! polls remote regions for replication lag, and carries out replica
//! promotion on behalf of the failover orchestrator. It observes and
//! commands replication through each region's management endpoint; the
//! streaming protocol itself lives in the storage engine.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                REPLICATION TOPOLOGY TRACKER                   │
//! │                                                               │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────┐  │
//! │  │  Topology   │  │  Lag Poller  │  │  Tenant Migration   │  │
//! │  │   State     │  │  (fan-out)   │  │  (export → import)  │  │
//! │  └──────┬──────┘  └──────┬───────┘  └──────────┬──────────┘  │
//! │         └────────────────┴─────────────────────┘             │
//! │                          │                                    │
//! │                          ▼                                    │
//! │        GET /replication/lag   POST /replication/promote      │
//! │        POST /tenants/{id}/export   POST /tenants/{id}/import │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod migration;
pub mod topology;
pub mod tracker;

pub use migration::{MigrationResult, MigrationStatus};
pub use topology::{PromotionResult, ReplicationRole, ReplicationState, ReplicationStatus, TopologySnapshot};
pub use tracker::{ReplicationConfig, ReplicationTracker, LAG_UNREACHABLE};

use geo_common::HttpError;
use thiserror::Error;

/// Replication tracker errors
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Referenced region has no configured replication state.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// Promotion target is not currently tracked as a replica.
    #[error("not a replica: {0}")]
    NotAReplica(String),

    /// No topology has been configured yet.
    #[error("replication topology not configured")]
    NotConfigured,

    /// Tenant export failed; nothing was migrated, retry is safe.
    #[error("tenant export from {region} failed: {source}")]
    Export {
        /// Source region of the failed export.
        region: String,
        /// Underlying transport/status error.
        #[source]
        source: HttpError,
    },
}

/// Result type for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;
