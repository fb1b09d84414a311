//! OpenGeo Region Directory (ORD)
//!
//! In-memory catalog of deployment regions and per-tenant residency pins.
//! Pure data and selection logic; the only network activity is the
//! health-probe fan-out.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     REGION DIRECTORY                        │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │   Region     │  │  Residency   │  │   Health Probe   │  │
//! │  │   Catalog    │  │     Pins     │  │     Fan-out      │  │
//! │  └──────┬───────┘  └──────┬───────┘  └────────┬─────────┘  │
//! │         └─────────────────┴───────────────────┘            │
//! │                           │                                 │
//! │                           ▼                                 │
//! │                  Routing decisions                          │
//! │     pin > primary (lowest latency) > healthy secondary      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod directory;
pub mod model;
pub mod probe;

pub use directory::{DirectoryConfig, RegionDirectory};
pub use model::{ProbeResult, RegionDescriptor, RegionStatus, RoutingDecision};

use thiserror::Error;

/// Region Directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Referenced region is not registered.
    #[error("unknown region: {0}")]
    UnknownRegion(String),
}

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, DirectoryError>;
