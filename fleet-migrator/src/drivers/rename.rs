use std::sync::Arc;

use fleet_common::retry::RetryPolicy;
use fleet_common::types::{HostSet, StageResult};
use tracing::{debug, warn};

use crate::error::MigrationError;
use crate::fleet::{LegacyFleet, RenameDirection};
use crate::metrics_consts::RENAME_ATTEMPTS;

/// Marks hosts as migrated in the legacy system, which stops it from scheduling work on them.
pub struct RenameDriver {
    legacy: Arc<dyn LegacyFleet>,
    retry_policy: RetryPolicy,
}

impl RenameDriver {
    pub fn new(legacy: Arc<dyn LegacyFleet>, retry_policy: RetryPolicy) -> Self {
        Self {
            legacy,
            retry_policy,
        }
    }

    pub async fn run(&self, hosts: &HostSet) -> Result<StageResult, MigrationError> {
        let mut remaining = hosts.clone();
        let mut attempt = 0;

        while !remaining.is_empty() && attempt < self.retry_policy.max_attempts {
            if attempt > 0 {
                super::backoff(&self.retry_policy, attempt).await;
            }
            attempt += 1;

            metrics::counter!(RENAME_ATTEMPTS).increment(remaining.len() as u64);
            let renamed = self
                .legacy
                .rename(&remaining, RenameDirection::ForMigration)
                .await?;
            for host in &renamed {
                remaining.remove(host);
            }
            debug!(
                attempt,
                renamed = renamed.len(),
                remaining = remaining.len(),
                "rename attempt finished"
            );
        }

        if !remaining.is_empty() {
            warn!(hosts = remaining.len(), "some hosts could not be renamed");
        }

        Ok(StageResult {
            succeeded: hosts.difference(&remaining).cloned().collect(),
            failed: remaining,
        })
    }
}
