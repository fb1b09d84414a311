//! Failover state machine and detection loop

use crate::record::{FailoverRecord, FailoverState, FailoverStatus, RollbackResult};
use crate::{FailoverError, Result};
use chrono::Utc;
use geo_common::{probe_live, ProbeOutcome, RegionName};
use geo_directory::{RegionDirectory, RegionStatus};
use geo_replication::ReplicationTracker;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Consecutive probe failures required to confirm a region failure.
    pub failure_threshold: u32,
    /// Delay between detection probes and between auto-detection passes.
    pub check_interval: Duration,
    /// Timeout for a single detection probe.
    pub probe_timeout: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            check_interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Detects region failures, drives failovers, and rolls them back.
///
/// Failover and rollback are mutually exclusive through a single in-process
/// flag; this is deliberately not a distributed lock and protects against
/// concurrent triggers within one process only.
pub struct FailoverOrchestrator {
    directory: Arc<RegionDirectory>,
    replication: Arc<ReplicationTracker>,
    config: FailoverConfig,
    client: reqwest::Client,
    failover_active: AtomicBool,
    active_record: RwLock<Option<Uuid>>,
    original_primary: RwLock<Option<RegionName>>,
    failure_counts: RwLock<HashMap<RegionName, u32>>,
    history: RwLock<Vec<FailoverRecord>>,
}

impl FailoverOrchestrator {
    /// Create an orchestrator over the given directory and tracker.
    pub fn new(
        directory: Arc<RegionDirectory>,
        replication: Arc<ReplicationTracker>,
        config: FailoverConfig,
    ) -> Self {
        Self {
            directory,
            replication,
            config,
            client: reqwest::Client::new(),
            failover_active: AtomicBool::new(false),
            active_record: RwLock::new(None),
            original_primary: RwLock::new(None),
            failure_counts: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Confirm whether a region has failed.
    ///
    /// Runs up to `failure_threshold` sequential probes with
    /// `check_interval` sleeps in between. Any answered probe (even a
    /// degraded one) resets the region's consecutive-failure counter and
    /// returns false; only a full run of transport failures confirms the
    /// failure and marks the region Unavailable. Sequential on purpose:
    /// detection latency is traded for immunity to transient blips.
    pub async fn detect_failure(&self, region: &str) -> Result<bool> {
        let descriptor = self
            .directory
            .get_region(region)
            .ok_or_else(|| FailoverError::UnknownRegion(region.to_string()))?;

        for attempt in 1..=self.config.failure_threshold {
            match probe_live(&self.client, &descriptor.endpoint, self.config.probe_timeout).await {
                ProbeOutcome::Up { .. } | ProbeOutcome::Degraded { .. } => {
                    self.failure_counts.write().insert(region.to_string(), 0);
                    return Ok(false);
                }
                ProbeOutcome::Unreachable { error } => {
                    tracing::warn!(
                        %region,
                        attempt,
                        threshold = self.config.failure_threshold,
                        %error,
                        "detection probe failed"
                    );
                    *self.failure_counts.write().entry(region.to_string()).or_insert(0) += 1;
                }
            }
            if attempt < self.config.failure_threshold {
                tokio::time::sleep(self.config.check_interval).await;
            }
        }

        tracing::error!(%region, "region failure confirmed");
        self.directory.set_status(region, RegionStatus::Unavailable)?;
        Ok(true)
    }

    /// Fail over from `failed_region` to `target_region`.
    ///
    /// Rejected while another failover or rollback is active. On promotion
    /// failure the record is marked Failed and the error is returned; the
    /// exclusion flag is cleared on every path.
    pub async fn trigger_failover(
        &self,
        failed_region: &str,
        target_region: &str,
        initiated_by: &str,
    ) -> Result<FailoverRecord> {
        if self
            .failover_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FailoverError::FailoverInProgress);
        }

        let result = self.run_failover(failed_region, target_region, initiated_by).await;

        *self.active_record.write() = None;
        self.failover_active.store(false, Ordering::SeqCst);
        result
    }

    async fn run_failover(
        &self,
        failed_region: &str,
        target_region: &str,
        initiated_by: &str,
    ) -> Result<FailoverRecord> {
        let failed = self
            .directory
            .get_region(failed_region)
            .ok_or_else(|| FailoverError::UnknownRegion(failed_region.to_string()))?;
        if self.directory.get_region(target_region).is_none() {
            return Err(FailoverError::UnknownRegion(target_region.to_string()));
        }

        tracing::warn!(
            failed = %failed_region,
            target = %target_region,
            %initiated_by,
            "starting failover"
        );

        let record = FailoverRecord::new(failed_region, target_region, initiated_by);
        let record_id = record.id;
        *self.active_record.write() = Some(record_id);
        self.history.write().push(record);

        if failed.is_primary {
            *self.original_primary.write() = Some(failed_region.to_string());
        }
        self.directory.set_status(failed_region, RegionStatus::Unavailable)?;
        self.update_record(record_id, |r| r.state = FailoverState::InProgress);

        match self.replication.promote_replica(target_region).await {
            Ok(promotion) => {
                self.directory.set_primary(target_region, true)?;
                self.directory.set_primary(failed_region, false)?;
                self.directory.set_status(target_region, RegionStatus::Failover)?;

                let metadata = serde_json::to_value(&promotion).unwrap_or(serde_json::Value::Null);
                let record = self.update_record(record_id, |r| {
                    r.state = FailoverState::Complete;
                    r.completed_at = Some(Utc::now());
                    r.metadata.insert("promotion".to_string(), metadata.clone());
                });
                // History is append-only, so the record is normally still
                // there; rebuild it rather than panic with the flag held.
                let record = record.unwrap_or_else(|| {
                    let mut rebuilt = FailoverRecord::new(failed_region, target_region, initiated_by);
                    rebuilt.id = record_id;
                    rebuilt.state = FailoverState::Complete;
                    rebuilt.completed_at = Some(Utc::now());
                    rebuilt.metadata.insert("promotion".to_string(), metadata);
                    self.history.write().push(rebuilt.clone());
                    rebuilt
                });
                tracing::info!(failed = %failed_region, target = %target_region, "failover complete");
                Ok(record)
            }
            Err(e) => {
                tracing::error!(failed = %failed_region, target = %target_region, error = %e, "failover failed");
                self.update_record(record_id, |r| {
                    r.state = FailoverState::Failed;
                    r.completed_at = Some(Utc::now());
                    r.error_message = Some(e.to_string());
                });
                Err(e.into())
            }
        }
    }

    /// Restore a recovered region to primary.
    ///
    /// Rejected while a failover is active or while the region is still
    /// Unavailable. Promotes the region, restores its directory flags,
    /// demotes whichever region currently holds the primary flag, and
    /// clears the original-primary memory and the region's failure counter.
    pub async fn rollback_failover(&self, region: &str) -> Result<RollbackResult> {
        if self
            .failover_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FailoverError::FailoverInProgress);
        }

        let result = self.run_rollback(region).await;
        self.failover_active.store(false, Ordering::SeqCst);
        result
    }

    async fn run_rollback(&self, region: &str) -> Result<RollbackResult> {
        let descriptor = self
            .directory
            .get_region(region)
            .ok_or_else(|| FailoverError::UnknownRegion(region.to_string()))?;
        if descriptor.status == RegionStatus::Unavailable {
            return Err(FailoverError::RegionStillUnavailable(region.to_string()));
        }

        tracing::warn!(%region, "rolling back failover");
        self.replication.promote_replica(region).await?;

        self.directory.set_primary(region, true)?;
        self.directory.set_status(region, RegionStatus::Healthy)?;

        let mut demoted = None;
        for other in self.directory.list_regions() {
            if other.name != region && other.is_primary {
                self.directory.set_primary(&other.name, false)?;
                self.directory.set_status(&other.name, RegionStatus::Healthy)?;
                demoted = Some(other.name);
            }
        }

        *self.original_primary.write() = None;
        self.failure_counts.write().remove(region);

        // The Complete record of the failover being undone moves to its
        // RolledBack terminal state.
        let rolled_back_record = {
            let mut history = self.history.write();
            history
                .iter_mut()
                .rev()
                .find(|r| r.state == FailoverState::Complete && r.failed_region == region)
                .map(|r| {
                    r.state = FailoverState::RolledBack;
                    r.completed_at = Some(Utc::now());
                    r.id
                })
        };

        tracing::info!(%region, demoted = ?demoted, "rollback complete");
        Ok(RollbackResult {
            restored_primary: region.to_string(),
            demoted_region: demoted,
            rolled_back_record,
            completed_at: Utc::now(),
        })
    }

    /// Point-in-time status: active failover, original primary, failure
    /// counters, and the full history newest-first.
    pub fn get_failover_status(&self) -> FailoverStatus {
        let mut history = self.history.read().clone();
        history.reverse();
        let active_id = *self.active_record.read();
        let active_record = active_id.and_then(|id| history.iter().find(|r| r.id == id).cloned());
        FailoverStatus {
            active: self.failover_active.load(Ordering::SeqCst),
            active_record,
            original_primary: self.original_primary.read().clone(),
            failure_counts: self.failure_counts.read().clone(),
            total_failovers: history.len(),
            history,
        }
    }

    /// Supervisory loop: every `check_interval`, run failure detection over
    /// the watch list and fail over to the preferred target on confirmation.
    ///
    /// A pass is skipped entirely while a failover is active. Per-region
    /// errors are logged and never stop the loop.
    pub async fn run_auto_detection(
        &self,
        watch_list: Vec<RegionName>,
        preferred_targets: HashMap<RegionName, RegionName>,
    ) {
        loop {
            tokio::time::sleep(self.config.check_interval).await;
            if self.failover_active.load(Ordering::SeqCst) {
                continue;
            }

            for region in &watch_list {
                match self.detect_failure(region).await {
                    Ok(false) => {}
                    Ok(true) => match preferred_targets.get(region) {
                        Some(target) => {
                            if let Err(e) = self.trigger_failover(region, target, "auto").await {
                                tracing::error!(%region, %target, error = %e, "auto failover failed");
                            }
                        }
                        None => {
                            tracing::error!(%region, "region failed but no preferred failover target is configured");
                        }
                    },
                    Err(e) => {
                        tracing::error!(%region, error = %e, "auto detection error");
                    }
                }
            }
        }
    }

    fn update_record(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut FailoverRecord),
    ) -> Option<FailoverRecord> {
        let mut history = self.history.write();
        let record = history.iter_mut().find(|r| r.id == id)?;
        apply(record);
        Some(record.clone())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_directory::{DirectoryConfig, RegionDescriptor};
    use geo_replication::{ReplicationConfig, ReplicationTracker};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn stub_region() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let _ = sock
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });
        format!("http://{}", addr)
    }

    fn fast_config() -> FailoverConfig {
        FailoverConfig {
            failure_threshold: 2,
            check_interval: Duration::from_millis(10),
            probe_timeout: Duration::from_millis(300),
        }
    }

    fn setup(primary_endpoint: &str, replica_endpoint: &str) -> FailoverOrchestrator {
        let directory = Arc::new(RegionDirectory::new(DirectoryConfig::default()));
        directory.register_region(RegionDescriptor::new("us-east-1", primary_endpoint).primary());
        directory.register_region(RegionDescriptor::new("eu-west-1", replica_endpoint));

        let replication = Arc::new(ReplicationTracker::new(ReplicationConfig {
            lag_timeout: Duration::from_millis(300),
            promote_timeout: Duration::from_millis(300),
            migration_timeout: Duration::from_millis(300),
        }));
        let mut endpoints = HashMap::new();
        endpoints.insert("us-east-1".to_string(), primary_endpoint.to_string());
        endpoints.insert("eu-west-1".to_string(), replica_endpoint.to_string());
        replication.configure_replication("us-east-1", &["eu-west-1".to_string()], endpoints, None);

        FailoverOrchestrator::new(directory, replication, fast_config())
    }

    #[tokio::test]
    async fn detect_failure_confirms_after_threshold() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");

        let failed = orch.detect_failure("us-east-1").await.unwrap();
        assert!(failed);
        assert_eq!(
            orch.directory.get_region("us-east-1").unwrap().status,
            RegionStatus::Unavailable
        );
        assert_eq!(orch.get_failover_status().failure_counts["us-east-1"], 2);
    }

    #[tokio::test]
    async fn detect_failure_resets_counter_on_success() {
        let healthy = stub_region().await;
        let orch = setup(&healthy, "http://127.0.0.1:1");
        orch.failure_counts.write().insert("us-east-1".to_string(), 5);

        let failed = orch.detect_failure("us-east-1").await.unwrap();
        assert!(!failed);
        assert_eq!(orch.get_failover_status().failure_counts["us-east-1"], 0);
    }

    #[tokio::test]
    async fn detect_failure_rejects_unknown_region() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");
        let err = orch.detect_failure("mars-1").await.unwrap_err();
        assert!(matches!(err, FailoverError::UnknownRegion(_)));
    }

    #[tokio::test]
    async fn trigger_failover_flips_directory_and_records_complete() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");

        let record = orch
            .trigger_failover("us-east-1", "eu-west-1", "manual:admin")
            .await
            .unwrap();
        assert_eq!(record.state, FailoverState::Complete);
        assert!(record.completed_at.is_some());
        assert!(record.metadata.contains_key("promotion"));

        let target = orch.directory.get_region("eu-west-1").unwrap();
        assert!(target.is_primary);
        assert_eq!(target.status, RegionStatus::Failover);

        let failed = orch.directory.get_region("us-east-1").unwrap();
        assert!(!failed.is_primary);
        assert_eq!(failed.status, RegionStatus::Unavailable);

        let status = orch.get_failover_status();
        assert_eq!(status.total_failovers, 1);
        assert!(!status.active);
        assert_eq!(status.original_primary.as_deref(), Some("us-east-1"));

        // The returned record is the history entry, not a detached copy.
        assert_eq!(status.history[0].id, record.id);
        assert_eq!(status.history[0].state, FailoverState::Complete);

        // Directory and tracker agree on the primary.
        assert_eq!(
            orch.replication.get_topology().primary_region.as_deref(),
            Some("eu-west-1")
        );
    }

    #[tokio::test]
    async fn concurrent_triggers_admit_exactly_one() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");

        let (a, b) = tokio::join!(
            orch.trigger_failover("us-east-1", "eu-west-1", "manual:a"),
            orch.trigger_failover("us-east-1", "eu-west-1", "manual:b"),
        );

        let (record, err) = match (a, b) {
            (Ok(record), Err(err)) => (record, err),
            (Err(err), Ok(record)) => (record, err),
            other => panic!("expected exactly one winner, got {:?}", other),
        };
        assert_eq!(record.state, FailoverState::Complete);
        assert!(matches!(err, FailoverError::FailoverInProgress));

        let status = orch.get_failover_status();
        assert_eq!(status.total_failovers, 1);
        assert!(!status.active);
    }

    #[tokio::test]
    async fn rollback_is_rejected_while_a_failover_runs() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");

        let (trigger, rollback) = tokio::join!(
            orch.trigger_failover("us-east-1", "eu-west-1", "manual:admin"),
            orch.rollback_failover("us-east-1"),
        );

        assert_eq!(trigger.unwrap().state, FailoverState::Complete);
        assert!(matches!(rollback.unwrap_err(), FailoverError::FailoverInProgress));
    }

    #[tokio::test]
    async fn failed_promotion_marks_record_failed_and_clears_flag() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");

        // Target not tracked as a replica: promotion is rejected.
        let err = orch
            .trigger_failover("eu-west-1", "us-east-1", "manual:admin")
            .await
            .unwrap_err();
        assert!(matches!(err, FailoverError::Promotion(_)));

        let status = orch.get_failover_status();
        assert!(!status.active);
        assert_eq!(status.history[0].state, FailoverState::Failed);
        assert!(status.history[0].error_message.is_some());

        // Flag was cleared: a valid failover can now run.
        let record = orch
            .trigger_failover("us-east-1", "eu-west-1", "manual:admin")
            .await
            .unwrap();
        assert_eq!(record.state, FailoverState::Complete);
    }

    #[tokio::test]
    async fn rollback_requires_region_to_be_reachable_again() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");
        orch.trigger_failover("us-east-1", "eu-west-1", "manual:admin")
            .await
            .unwrap();

        let err = orch.rollback_failover("us-east-1").await.unwrap_err();
        assert!(matches!(err, FailoverError::RegionStillUnavailable(_)));

        // Region recovers.
        orch.directory.set_status("us-east-1", RegionStatus::Healthy).unwrap();
        let result = orch.rollback_failover("us-east-1").await.unwrap();
        assert_eq!(result.restored_primary, "us-east-1");
        assert_eq!(result.demoted_region.as_deref(), Some("eu-west-1"));
        assert!(result.rolled_back_record.is_some());

        let restored = orch.directory.get_region("us-east-1").unwrap();
        assert!(restored.is_primary);
        assert_eq!(restored.status, RegionStatus::Healthy);

        let demoted = orch.directory.get_region("eu-west-1").unwrap();
        assert!(!demoted.is_primary);
        assert_eq!(demoted.status, RegionStatus::Healthy);

        let status = orch.get_failover_status();
        assert_eq!(status.original_primary, None);
        assert_eq!(status.history[0].state, FailoverState::RolledBack);
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let orch = setup("http://127.0.0.1:1", "http://127.0.0.1:1");
        orch.trigger_failover("us-east-1", "eu-west-1", "manual:a")
            .await
            .unwrap();
        // Second failover back the other way; us-east-1 is now a replica.
        orch.directory.set_status("eu-west-1", RegionStatus::Unavailable).unwrap();
        orch.trigger_failover("eu-west-1", "us-east-1", "manual:b")
            .await
            .unwrap();

        let status = orch.get_failover_status();
        assert_eq!(status.total_failovers, 2);
        assert_eq!(status.history[0].initiated_by, "manual:b");
        assert_eq!(status.history[1].initiated_by, "manual:a");
    }

    #[tokio::test]
    async fn auto_detection_fails_over_a_dead_region() {
        let orch = Arc::new(setup("http://127.0.0.1:1", "http://127.0.0.1:1"));

        let watch = vec!["us-east-1".to_string()];
        let mut targets = HashMap::new();
        targets.insert("us-east-1".to_string(), "eu-west-1".to_string());

        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.run_auto_detection(watch, targets).await });

        // One pass: sleep + 2 probes + promotion, all against refused ports.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if orch.get_failover_status().total_failovers > 0 {
                break;
            }
        }
        handle.abort();

        let status = orch.get_failover_status();
        assert!(status.total_failovers >= 1);
        assert_eq!(status.history[0].initiated_by, "auto");
        assert_eq!(status.history[0].state, FailoverState::Complete);
        assert!(orch.directory.get_region("eu-west-1").unwrap().is_primary);
    }
}
