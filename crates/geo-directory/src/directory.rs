//! Region catalog and selection logic

use crate::model::{RegionDescriptor, RegionStatus, RoutingDecision};
use crate::{DirectoryError, Result};
use chrono::Utc;
use geo_common::{RegionName, TenantId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Directory configuration.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Timeout for a single liveness probe.
    pub probe_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Why the selection algorithm chose a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SelectionReason {
    ResidencyPin,
    Primary,
    HealthySecondary,
}

impl SelectionReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::ResidencyPin => "data residency pin",
            Self::Primary => "primary region",
            Self::HealthySecondary => "failover to healthy secondary",
        }
    }
}

/// In-memory catalog of regions and tenant residency pins.
pub struct RegionDirectory {
    regions: RwLock<HashMap<RegionName, RegionDescriptor>>,
    pins: RwLock<HashMap<TenantId, RegionName>>,
    client: reqwest::Client,
    config: DirectoryConfig,
}

impl RegionDirectory {
    /// Create an empty directory.
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            regions: RwLock::new(HashMap::new()),
            pins: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Insert or overwrite a region by name. Last write wins.
    pub fn register_region(&self, descriptor: RegionDescriptor) {
        tracing::info!(region = %descriptor.name, endpoint = %descriptor.endpoint, "registering region");
        self.regions.write().insert(descriptor.name.clone(), descriptor);
    }

    /// Pin a tenant's traffic to a region, overwriting any prior pin.
    pub fn set_tenant_residency(&self, tenant: &str, region: &str) -> Result<()> {
        if !self.regions.read().contains_key(region) {
            return Err(DirectoryError::UnknownRegion(region.to_string()));
        }
        tracing::info!(%tenant, %region, "setting tenant residency pin");
        self.pins.write().insert(tenant.to_string(), region.to_string());
        Ok(())
    }

    /// The tenant's residency pin, if one is set.
    pub fn residency_pin(&self, tenant: &str) -> Option<RegionName> {
        self.pins.read().get(tenant).cloned()
    }

    /// Snapshot of one region.
    pub fn get_region(&self, name: &str) -> Option<RegionDescriptor> {
        self.regions.read().get(name).cloned()
    }

    /// Snapshot of every registered region.
    pub fn list_regions(&self) -> Vec<RegionDescriptor> {
        self.regions.read().values().cloned().collect()
    }

    /// Number of registered regions.
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    /// Whether the tenant's data may reside in the region, independent of
    /// health. False for unknown regions.
    pub fn check_data_residency(&self, tenant: &str, region: &str) -> bool {
        self.regions
            .read()
            .get(region)
            .map(|r| r.permits(tenant))
            .unwrap_or(false)
    }

    /// Pick the region that should serve this tenant.
    ///
    /// Priority: residency pin, then the primary with the lowest latency,
    /// then the lowest-latency healthy/degraded candidate. Returns `None`
    /// when no healthy or degraded region permits the tenant.
    pub fn get_optimal_region(&self, tenant: &str) -> Option<RegionDescriptor> {
        self.select(tenant).map(|(region, _)| region)
    }

    /// Routing decision for one request: chosen region plus the reason.
    pub fn route_request(&self, tenant: &str) -> Option<RoutingDecision> {
        let (region, reason) = self.select(tenant)?;
        let is_failover = self
            .residency_pin(tenant)
            .map(|pin| pin != region.name)
            .unwrap_or(false);
        Some(RoutingDecision {
            region: region.name.clone(),
            endpoint: region.endpoint.clone(),
            reason: reason.as_str().to_string(),
            latency_ms: region.latency_ms,
            is_failover,
        })
    }

    fn select(&self, tenant: &str) -> Option<(RegionDescriptor, SelectionReason)> {
        let regions = self.regions.read();

        let candidates: Vec<&RegionDescriptor> = regions
            .values()
            .filter(|r| {
                matches!(r.status, RegionStatus::Healthy | RegionStatus::Degraded) && r.permits(tenant)
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }

        // Residency pin wins over latency and primary status. The pinned
        // region only has to be reachable (not Unavailable) and permitting.
        if let Some(pin) = self.pins.read().get(tenant) {
            if let Some(pinned) = regions.get(pin) {
                if pinned.status != RegionStatus::Unavailable && pinned.permits(tenant) {
                    return Some((pinned.clone(), SelectionReason::ResidencyPin));
                }
            }
        }

        // Missing latency sorts last.
        if let Some(primary) = candidates
            .iter()
            .filter(|r| r.is_primary)
            .min_by_key(|r| r.latency_ms.unwrap_or(u64::MAX))
        {
            return Some(((*primary).clone(), SelectionReason::Primary));
        }

        candidates
            .iter()
            .min_by_key(|r| r.latency_ms.unwrap_or(u64::MAX))
            .map(|best| ((*best).clone(), SelectionReason::HealthySecondary))
    }

    /// Flip a region's primary flag. Used by the failover orchestrator.
    pub fn set_primary(&self, name: &str, is_primary: bool) -> Result<()> {
        let mut regions = self.regions.write();
        let region = regions
            .get_mut(name)
            .ok_or_else(|| DirectoryError::UnknownRegion(name.to_string()))?;
        region.is_primary = is_primary;
        Ok(())
    }

    /// Overwrite a region's status. Used by the failover orchestrator.
    pub fn set_status(&self, name: &str, status: RegionStatus) -> Result<()> {
        let mut regions = self.regions.write();
        let region = regions
            .get_mut(name)
            .ok_or_else(|| DirectoryError::UnknownRegion(name.to_string()))?;
        region.status = status;
        Ok(())
    }

    /// Record one probe outcome: status, latency, and check timestamp are
    /// updated together under a single write lock.
    pub(crate) fn apply_probe(&self, name: &str, status: RegionStatus, latency_ms: Option<u64>) {
        let mut regions = self.regions.write();
        if let Some(region) = regions.get_mut(name) {
            region.status = status;
            region.latency_ms = latency_ms;
            region.last_health_check = Some(Utc::now());
        }
    }

    pub(crate) fn probe_client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn probe_timeout(&self) -> Duration {
        self.config.probe_timeout
    }
}

impl Default for RegionDirectory {
    fn default() -> Self {
        Self::new(DirectoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(name: &str, latency: Option<u64>) -> RegionDescriptor {
        let mut r = RegionDescriptor::new(name, &format!("https://{}.example.com", name));
        r.latency_ms = latency;
        r
    }

    #[test]
    fn registration_is_last_write_wins() {
        let dir = RegionDirectory::default();
        dir.register_region(region("us-east-1", Some(10)));
        dir.register_region(region("us-east-1", Some(99)));
        assert_eq!(dir.region_count(), 1);
        assert_eq!(dir.get_region("us-east-1").unwrap().latency_ms, Some(99));
    }

    #[test]
    fn residency_pin_requires_known_region() {
        let dir = RegionDirectory::default();
        let err = dir.set_tenant_residency("acme", "mars-1").unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownRegion(_)));
    }

    #[test]
    fn pin_wins_over_primary_and_latency() {
        let dir = RegionDirectory::default();
        dir.register_region(region("us-east-1", Some(5)).primary());
        dir.register_region(region("eu-west-1", Some(250)));
        dir.set_tenant_residency("acme", "eu-west-1").unwrap();

        let chosen = dir.get_optimal_region("acme").unwrap();
        assert_eq!(chosen.name, "eu-west-1");
    }

    #[test]
    fn primary_wins_over_faster_secondary() {
        let dir = RegionDirectory::default();
        dir.register_region(region("us-east-1", Some(80)).primary());
        dir.register_region(region("eu-west-1", Some(5)));

        let chosen = dir.get_optimal_region("acme").unwrap();
        assert_eq!(chosen.name, "us-east-1");
    }

    #[test]
    fn unavailable_primary_falls_back_to_lowest_latency() {
        let dir = RegionDirectory::default();
        let mut primary = region("us-east-1", Some(5)).primary();
        primary.status = RegionStatus::Unavailable;
        dir.register_region(primary);
        dir.register_region(region("eu-west-1", Some(40)));
        dir.register_region(region("ap-south-1", Some(120)));

        let chosen = dir.get_optimal_region("acme").unwrap();
        assert_eq!(chosen.name, "eu-west-1");
    }

    #[test]
    fn missing_latency_sorts_last() {
        let dir = RegionDirectory::default();
        dir.register_region(region("eu-west-1", None));
        dir.register_region(region("ap-south-1", Some(300)));

        let chosen = dir.get_optimal_region("acme").unwrap();
        assert_eq!(chosen.name, "ap-south-1");
    }

    #[test]
    fn no_permitting_candidate_yields_none() {
        let dir = RegionDirectory::default();
        let mut r = region("us-east-1", Some(5)).primary();
        r.excluded_tenants.insert("acme".into());
        dir.register_region(r);
        assert!(dir.get_optimal_region("acme").is_none());
    }

    #[test]
    fn excluded_pinned_region_is_skipped() {
        let dir = RegionDirectory::default();
        dir.register_region(region("us-east-1", Some(5)).primary());
        let mut pinned = region("eu-west-1", Some(10));
        pinned.excluded_tenants.insert("acme".into());
        dir.register_region(pinned);
        // Pin was set before the exclusion took effect.
        dir.pins.write().insert("acme".into(), "eu-west-1".into());

        let chosen = dir.get_optimal_region("acme").unwrap();
        assert_eq!(chosen.name, "us-east-1");
    }

    #[test]
    fn check_data_residency_is_health_independent() {
        let dir = RegionDirectory::default();
        let mut r = region("us-east-1", None);
        r.status = RegionStatus::Unavailable;
        r.excluded_tenants.insert("evil".into());
        dir.register_region(r);

        assert!(dir.check_data_residency("acme", "us-east-1"));
        assert!(!dir.check_data_residency("evil", "us-east-1"));
        assert!(!dir.check_data_residency("acme", "unknown"));
    }

    #[test]
    fn route_request_reports_reason_and_failover_flag() {
        let dir = RegionDirectory::default();
        dir.register_region(region("us-east-1", Some(5)).primary());
        dir.register_region(region("eu-west-1", Some(50)));

        let decision = dir.route_request("acme").unwrap();
        assert_eq!(decision.region, "us-east-1");
        assert_eq!(decision.reason, "primary region");
        assert!(!decision.is_failover);

        dir.set_tenant_residency("acme", "eu-west-1").unwrap();
        let decision = dir.route_request("acme").unwrap();
        assert_eq!(decision.region, "eu-west-1");
        assert_eq!(decision.reason, "data residency pin");
        assert!(!decision.is_failover);

        // Pinned region goes dark: routing leaves the pin.
        dir.set_status("eu-west-1", RegionStatus::Unavailable).unwrap();
        let decision = dir.route_request("acme").unwrap();
        assert_eq!(decision.region, "us-east-1");
        assert!(decision.is_failover);
    }

    #[test]
    fn orchestrator_mutators_reject_unknown_regions() {
        let dir = RegionDirectory::default();
        assert!(dir.set_primary("nope", true).is_err());
        assert!(dir.set_status("nope", RegionStatus::Healthy).is_err());
    }
}
