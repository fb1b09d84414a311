//! Region Directory data model

use chrono::{DateTime, Utc};
use geo_common::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Health status of a region as seen by this control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    /// Liveness probe answered 200.
    Healthy,
    /// Liveness probe answered, but not with 200.
    Degraded,
    /// Transport-level failure: timeout, refused, DNS.
    Unavailable,
    /// Serving as the promoted target of an active failover.
    Failover,
}

/// One deployment region of the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDescriptor {
    /// Unique region name, e.g. `us-east-1`.
    pub name: String,
    /// Base URL for health and API calls.
    pub endpoint: String,
    /// Whether this region currently accepts writes.
    pub is_primary: bool,
    /// Tenants allowed here; empty means all tenants.
    pub allowed_tenants: HashSet<TenantId>,
    /// Tenants always denied here; checked before the allow list.
    pub excluded_tenants: HashSet<TenantId>,
    /// Last observed health.
    pub status: RegionStatus,
    /// Last measured round-trip, if any probe has completed.
    pub latency_ms: Option<u64>,
    /// When the last health probe ran.
    pub last_health_check: Option<DateTime<Utc>>,
}

impl RegionDescriptor {
    /// Create a healthy, non-primary region with open tenant access.
    pub fn new(name: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            is_primary: false,
            allowed_tenants: HashSet::new(),
            excluded_tenants: HashSet::new(),
            status: RegionStatus::Healthy,
            latency_ms: None,
            last_health_check: None,
        }
    }

    /// Mark this region as the write primary.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Whether this region may serve the tenant at all.
    ///
    /// The exclude list always wins; an empty allow list means open access.
    pub fn permits(&self, tenant: &str) -> bool {
        if self.excluded_tenants.contains(tenant) {
            return false;
        }
        self.allowed_tenants.is_empty() || self.allowed_tenants.contains(tenant)
    }
}

/// Per-request routing decision. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Chosen region name.
    pub region: String,
    /// Chosen region endpoint.
    pub endpoint: String,
    /// Why this region was chosen.
    pub reason: String,
    /// Last measured latency of the chosen region.
    pub latency_ms: Option<u64>,
    /// True when the chosen region differs from the tenant's residency pin.
    pub is_failover: bool,
}

/// Result of one liveness probe, as returned by the probe fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probed region.
    pub region: String,
    /// Whether the region is considered healthy.
    pub healthy: bool,
    /// Status recorded in the directory from this probe.
    pub status: RegionStatus,
    /// Measured round-trip, absent on transport failure.
    pub latency_ms: Option<u64>,
    /// Transport error message, if the region was unreachable.
    pub error: Option<String>,
    /// When the probe completed.
    pub checked_at: DateTime<Utc>,
}
