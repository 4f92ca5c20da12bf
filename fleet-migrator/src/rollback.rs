//! Undo a migration: take hosts out of the target system, give them their legacy names
//! back and unlock them.
use std::sync::Arc;

use fleet_common::types::{HostId, HostSet};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::MigrationError;
use crate::fleet::{ApplyOutcome, LegacyFleet, RenameDirection, TargetFleet};
use crate::metrics_consts::ROLLBACK_BATCHES;

pub const ROLLBACK_BATCH_SIZE: usize = 200;
pub const DEFAULT_ROLLBACK_BUG: &str = "b/7";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub batches: Vec<Vec<HostId>>,
    /// Hosts renamed back to their legacy name.
    pub restored: HostSet,
    /// Hosts the legacy system did not report as unlocked.
    pub still_locked: HostSet,
}

pub struct Rollback {
    legacy: Arc<dyn LegacyFleet>,
    target: Arc<dyn TargetFleet>,
    bug: String,
    batch_size: usize,
}

impl Rollback {
    pub fn new(
        legacy: Arc<dyn LegacyFleet>,
        target: Arc<dyn TargetFleet>,
        bug: Option<String>,
    ) -> Self {
        Self {
            legacy,
            target,
            bug: bug.unwrap_or_else(|| DEFAULT_ROLLBACK_BUG.to_owned()),
            batch_size: ROLLBACK_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Roll `hosts` back in batches. With `dry_run` nothing is called and only the batches
    /// that would have been processed are reported.
    pub async fn run(
        &self,
        hosts: &HostSet,
        dry_run: bool,
    ) -> Result<RollbackReport, MigrationError> {
        let mut report = RollbackReport {
            batches: batches(hosts, self.batch_size),
            ..Default::default()
        };

        if dry_run {
            info!(batches = report.batches.len(), "dry run, not rolling back");
            return Ok(report);
        }

        for batch in &report.batches {
            let batch: HostSet = batch.iter().cloned().collect();
            metrics::counter!(ROLLBACK_BATCHES).increment(1);

            let removed = self.target.remove(&batch, &self.bug).await?;
            if let ApplyOutcome::Failed { reason } = removed {
                warn!(
                    hosts = batch.len(),
                    %reason,
                    "failed to remove hosts from the target system"
                );
            }

            let renamed = self
                .legacy
                .rename(&batch, RenameDirection::ForRollback)
                .await?;
            report.restored.extend(renamed);

            let unlocked: HostSet = self.legacy.unlock(&batch).await?.into_iter().collect();
            report
                .still_locked
                .extend(batch.difference(&unlocked).cloned());
        }

        info!(
            restored = report.restored.len(),
            still_locked = report.still_locked.len(),
            "rollback finished"
        );
        Ok(report)
    }
}

fn batches(hosts: &HostSet, batch_size: usize) -> Vec<Vec<HostId>> {
    let hosts: Vec<HostId> = hosts.iter().cloned().collect();
    hosts.chunks(batch_size).map(<[HostId]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockFleet, MockHost};
    use fleet_common::types::host_set;

    fn rollback(fleet: &MockFleet) -> Rollback {
        Rollback::new(Arc::new(fleet.clone()), Arc::new(fleet.clone()), None)
    }

    #[test]
    fn test_batches() {
        let hosts: HostSet = (0..5).map(|i| HostId::new(format!("h{i}"))).collect();
        let sizes: Vec<usize> = batches(&hosts, 2).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(batches(&HostSet::new(), 2).is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_calls_nothing() {
        let fleet = MockFleet::new().with_idle_hosts(&["a", "b", "c"]);
        let report = rollback(&fleet)
            .with_batch_size(2)
            .run(&host_set(["a", "b", "c"]), true)
            .await
            .unwrap();

        assert_eq!(report.batches.len(), 2);
        assert!(report.restored.is_empty());
        assert!(fleet.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_restores_and_unlocks() {
        let fleet = MockFleet::new()
            .with_host("a", MockHost::idle().locked())
            .with_host("b", MockHost::idle().locked().failing_rename());
        let report = rollback(&fleet)
            .run(&host_set(["a", "b", "ghost"]), false)
            .await
            .unwrap();

        assert_eq!(report.restored, host_set(["a"]));
        assert_eq!(report.still_locked, host_set(["ghost"]));
        assert!(!fleet.host("a").unwrap().locked);
        assert!(!fleet.host("b").unwrap().locked);
        assert_eq!(
            fleet.calls()[0],
            MockCall::Remove(host_set(["a", "b", "ghost"]))
        );
    }
}
