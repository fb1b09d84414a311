//! Topology tracking, lag polling, and promotion

use crate::topology::{PromotionResult, ReplicationRole, ReplicationState, ReplicationStatus, TopologySnapshot};
use crate::{ReplicationError, Result};
use chrono::Utc;
use geo_common::{HttpResult, ManagementClient, RegionName};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Sentinel returned when a replica's lag cannot be measured. Distinguishes
/// "unreachable" from a genuine zero-lag reading.
pub const LAG_UNREACHABLE: f64 = -1.0;

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Timeout for a single lag query.
    pub lag_timeout: Duration,
    /// Timeout for the remote promotion call.
    pub promote_timeout: Duration,
    /// Timeout for each half of a tenant migration.
    pub migration_timeout: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            lag_timeout: Duration::from_secs(5),
            promote_timeout: Duration::from_secs(30),
            migration_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Deserialize)]
struct LagResponse {
    lag_seconds: f64,
}

/// Tracks primary/replica roles and commands promotion.
pub struct ReplicationTracker {
    primary: RwLock<Option<RegionName>>,
    replicas: RwLock<Vec<RegionName>>,
    states: RwLock<HashMap<RegionName, ReplicationState>>,
    pub(crate) endpoints: RwLock<HashMap<RegionName, String>>,
    pub(crate) client: Arc<ManagementClient>,
    pub(crate) config: ReplicationConfig,
}

impl ReplicationTracker {
    /// Create an unconfigured tracker.
    pub fn new(config: ReplicationConfig) -> Self {
        Self {
            primary: RwLock::new(None),
            replicas: RwLock::new(Vec::new()),
            states: RwLock::new(HashMap::new()),
            endpoints: RwLock::new(HashMap::new()),
            client: Arc::new(ManagementClient::new()),
            config,
        }
    }

    /// Initialize the topology: one primary, any number of replicas, their
    /// management endpoints, and the bearer credential for management calls.
    pub fn configure_replication(
        &self,
        primary: &str,
        replicas: &[RegionName],
        endpoints: HashMap<RegionName, String>,
        credential: Option<String>,
    ) {
        tracing::info!(%primary, replica_count = replicas.len(), "configuring replication topology");
        self.client.set_credential(credential);

        let now = Utc::now();
        let mut states = HashMap::new();
        states.insert(
            primary.to_string(),
            ReplicationState {
                region: primary.to_string(),
                role: ReplicationRole::Primary,
                status: ReplicationStatus::Streaming,
                lag_seconds: Some(0.0),
                primary_region: None,
                last_updated: now,
            },
        );
        for replica in replicas {
            states.insert(
                replica.clone(),
                ReplicationState {
                    region: replica.clone(),
                    role: ReplicationRole::Replica,
                    status: ReplicationStatus::Unknown,
                    lag_seconds: None,
                    primary_region: Some(primary.to_string()),
                    last_updated: now,
                },
            );
        }

        *self.primary.write() = Some(primary.to_string());
        *self.replicas.write() = replicas.to_vec();
        *self.states.write() = states;
        *self.endpoints.write() = endpoints;
    }

    /// Replication lag of one region, in seconds.
    ///
    /// The primary reports 0 and unknown regions report [`LAG_UNREACHABLE`],
    /// both without a network call. A replica is queried over its management
    /// endpoint; any failure marks it Stopped and yields the sentinel.
    pub async fn get_replication_lag(&self, region: &str) -> f64 {
        if !self.states.read().contains_key(region) {
            return LAG_UNREACHABLE;
        }
        if self.primary.read().as_deref() == Some(region) {
            return 0.0;
        }

        let endpoint = self.endpoints.read().get(region).cloned();
        let result = match endpoint {
            Some(ep) => fetch_lag(&self.client, &ep, self.config.lag_timeout).await,
            None => Err(geo_common::HttpError::Transport(format!(
                "no management endpoint for {}",
                region
            ))),
        };
        self.apply_lag(region, result)
    }

    /// Lag of every configured replica, queried concurrently.
    ///
    /// A per-region failure is isolated to that region's sentinel entry.
    pub async fn get_all_replication_lag(&self) -> HashMap<RegionName, f64> {
        let replicas: Vec<RegionName> = self.replicas.read().clone();
        let endpoints = self.endpoints.read().clone();

        let mut handles = Vec::with_capacity(replicas.len());
        for replica in replicas {
            let endpoint = endpoints.get(&replica).cloned();
            let client = self.client.clone();
            let timeout = self.config.lag_timeout;
            handles.push(tokio::spawn(async move {
                let result = match endpoint {
                    Some(ep) => fetch_lag(&client, &ep, timeout).await,
                    None => Err(geo_common::HttpError::Transport(format!(
                        "no management endpoint for {}",
                        replica
                    ))),
                };
                (replica, result)
            }));
        }

        let mut lags = HashMap::with_capacity(handles.len());
        for handle in handles {
            if let Ok((replica, result)) = handle.await {
                let lag = self.apply_lag(&replica, result);
                lags.insert(replica, lag);
            }
        }
        lags
    }

    fn apply_lag(&self, region: &str, result: HttpResult<f64>) -> f64 {
        let mut states = self.states.write();
        let state = match states.get_mut(region) {
            Some(s) => s,
            None => return LAG_UNREACHABLE,
        };
        match result {
            Ok(lag) => {
                state.lag_seconds = Some(lag);
                state.status = ReplicationStatus::Streaming;
                state.last_updated = Utc::now();
                lag
            }
            Err(e) => {
                tracing::warn!(%region, error = %e, "lag query failed");
                state.lag_seconds = None;
                state.status = ReplicationStatus::Stopped;
                state.last_updated = Utc::now();
                LAG_UNREACHABLE
            }
        }
    }

    /// Promote a tracked replica to primary.
    ///
    /// The remote "become primary" call is best-effort: a failure is logged
    /// and local topology is updated anyway, to be reconciled by subsequent
    /// health probes. The previous primary is demoted to a stopped replica
    /// and must re-synchronize before serving reads again.
    pub async fn promote_replica(&self, region: &str) -> Result<PromotionResult> {
        if !self.replicas.read().iter().any(|r| r == region) {
            return Err(ReplicationError::NotAReplica(region.to_string()));
        }
        let previous_primary = self
            .primary
            .read()
            .clone()
            .ok_or(ReplicationError::NotConfigured)?;

        let endpoint = self.endpoints.read().get(region).cloned();
        match endpoint {
            Some(ep) => {
                let url = format!("{}/replication/promote", ep.trim_end_matches('/'));
                if let Err(e) = self.client.post_empty(&url, self.config.promote_timeout).await {
                    tracing::warn!(%region, error = %e, "remote promote call failed, updating local topology anyway");
                }
            }
            None => {
                tracing::warn!(%region, "no management endpoint configured, skipping remote promote call");
            }
        }

        let now = Utc::now();
        {
            let mut states = self.states.write();
            if let Some(old) = states.get_mut(&previous_primary) {
                old.role = ReplicationRole::Replica;
                old.status = ReplicationStatus::Stopped;
                old.lag_seconds = None;
                old.primary_region = Some(region.to_string());
                old.last_updated = now;
            }
            if let Some(target) = states.get_mut(region) {
                target.role = ReplicationRole::Primary;
                target.status = ReplicationStatus::Streaming;
                target.lag_seconds = Some(0.0);
                target.primary_region = None;
                target.last_updated = now;
            }
        }

        *self.primary.write() = Some(region.to_string());
        {
            let mut replicas = self.replicas.write();
            replicas.retain(|r| r != region);
            replicas.push(previous_primary.clone());
        }

        tracing::info!(new_primary = %region, %previous_primary, "replica promoted");
        Ok(PromotionResult {
            previous_primary,
            new_primary: region.to_string(),
            promoted_at: now,
        })
    }

    /// Read-only dump of the tracked topology.
    pub fn get_topology(&self) -> TopologySnapshot {
        TopologySnapshot {
            primary_region: self.primary.read().clone(),
            replicas: self.replicas.read().clone(),
            states: self.states.read().clone(),
            taken_at: Utc::now(),
        }
    }

    pub(crate) fn management_endpoint(&self, region: &str) -> Result<String> {
        self.endpoints
            .read()
            .get(region)
            .cloned()
            .ok_or_else(|| ReplicationError::UnknownRegion(region.to_string()))
    }
}

impl Default for ReplicationTracker {
    fn default() -> Self {
        Self::new(ReplicationConfig::default())
    }
}

async fn fetch_lag(client: &ManagementClient, endpoint: &str, timeout: Duration) -> HttpResult<f64> {
    let url = format!("{}/replication/lag", endpoint.trim_end_matches('/'));
    let resp: LagResponse = client.get_json(&url, timeout).await?;
    Ok(resp.lag_seconds)
}
