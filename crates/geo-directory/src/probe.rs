//! Concurrent health-probe fan-out

use crate::directory::RegionDirectory;
use crate::model::{ProbeResult, RegionStatus};
use chrono::Utc;
use geo_common::{probe_live, ProbeOutcome, RegionName};
use std::collections::HashMap;

impl RegionDirectory {
    /// Probe every registered region's liveness endpoint concurrently.
    ///
    /// Always returns one entry per registered region; a single region's
    /// failure never fails the call. Each region's status, latency, and
    /// check timestamp are recorded as one atomic update.
    pub async fn probe_all_regions(&self) -> HashMap<RegionName, ProbeResult> {
        let targets: Vec<(String, String)> = self
            .list_regions()
            .into_iter()
            .map(|r| (r.name, r.endpoint))
            .collect();

        let mut handles = Vec::with_capacity(targets.len());
        for (name, endpoint) in targets {
            let client = self.probe_client().clone();
            let timeout = self.probe_timeout();
            handles.push(tokio::spawn(async move {
                let outcome = probe_live(&client, &endpoint, timeout).await;
                (name, outcome)
            }));
        }

        let mut results = HashMap::with_capacity(handles.len());
        for handle in handles {
            if let Ok((name, outcome)) = handle.await {
                let result = self.record_outcome(&name, outcome);
                results.insert(name, result);
            }
        }
        results
    }

    fn record_outcome(&self, name: &str, outcome: ProbeOutcome) -> ProbeResult {
        let (status, latency_ms, error) = match outcome {
            ProbeOutcome::Up { latency_ms } => (RegionStatus::Healthy, Some(latency_ms), None),
            ProbeOutcome::Degraded { latency_ms, status } => {
                tracing::debug!(region = %name, status, "region degraded");
                (RegionStatus::Degraded, Some(latency_ms), None)
            }
            ProbeOutcome::Unreachable { error } => {
                tracing::warn!(region = %name, %error, "region unreachable");
                (RegionStatus::Unavailable, None, Some(error))
            }
        };

        self.apply_probe(name, status, latency_ms);

        ProbeResult {
            region: name.to_string(),
            healthy: status == RegionStatus::Healthy,
            status,
            latency_ms,
            error,
            checked_at: Utc::now(),
        }
    }
}
