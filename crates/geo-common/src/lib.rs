//! OpenGeo Common
//!
//! Shared types and the per-region management API client used by the
//! directory, replication, and failover crates.
//!
//! Every remote call in the control plane goes through [`ManagementClient`]
//! or [`probe_live`]: bounded-timeout HTTP with transport failures surfaced
//! as values, never panics.

#![warn(missing_docs)]

pub mod http;

pub use http::{HttpError, HttpResult, ManagementClient, ProbeOutcome, probe_live};

/// Tenant identifier as issued by the platform's tenant registry.
pub type TenantId = String;

/// Unique region name, e.g. `us-east-1`.
pub type RegionName = String;
