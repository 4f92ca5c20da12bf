use std::sync::Arc;

use fleet_common::error::InvalidArgument;
use fleet_common::retry::RetryPolicy;
use fleet_common::types::{HostSet, StageResult};
use tracing::{debug, info, warn};

use crate::error::MigrationError;
use crate::fleet::LegacyFleet;
use crate::metrics_consts::LOCK_ATTEMPTS;

/// Locks hosts in the legacy system so nothing new gets scheduled on them.
///
/// The lock call itself is fire-and-forget: a host that was already locked makes the
/// legacy tool complain, but that is the state we want anyway. Whether a host is locked
/// is always read back from its status.
pub struct LockDriver {
    legacy: Arc<dyn LegacyFleet>,
    retry_policy: RetryPolicy,
}

impl LockDriver {
    pub fn new(legacy: Arc<dyn LegacyFleet>, retry_policy: RetryPolicy) -> Self {
        Self {
            legacy,
            retry_policy,
        }
    }

    pub async fn run(&self, hosts: &HostSet, reason: &str) -> Result<StageResult, MigrationError> {
        if reason.trim().is_empty() {
            return Err(InvalidArgument::MissingReason.into());
        }

        let mut locked = HostSet::new();
        let mut to_lock = hosts.clone();
        let mut attempt = 0;

        while !to_lock.is_empty() && attempt < self.retry_policy.max_attempts {
            if attempt > 0 {
                super::backoff(&self.retry_policy, attempt).await;
            }
            attempt += 1;

            metrics::counter!(LOCK_ATTEMPTS).increment(to_lock.len() as u64);
            self.legacy.lock(&to_lock, reason).await?;

            let observed = self.observe_locked(&to_lock).await?;
            to_lock.retain(|h| !observed.contains(h));
            debug!(
                attempt,
                locked = observed.len(),
                remaining = to_lock.len(),
                "lock attempt finished"
            );
            locked.extend(observed);
        }

        if to_lock.is_empty() {
            info!(hosts = locked.len(), "locked all hosts");
        } else {
            warn!(
                locked = locked.len(),
                not_locked = to_lock.len(),
                attempts = attempt,
                "some hosts could not be locked"
            );
        }

        Ok(StageResult {
            succeeded: locked,
            failed: to_lock,
        })
    }

    /// Check which of `hosts` are locked, without changing anything.
    pub async fn verify_locked(&self, hosts: &HostSet) -> Result<StageResult, MigrationError> {
        if hosts.is_empty() {
            return Ok(StageResult::default());
        }
        let observed = self.observe_locked(hosts).await?;
        Ok(StageResult::from_successes(hosts, &observed))
    }

    async fn observe_locked(&self, hosts: &HostSet) -> Result<HostSet, MigrationError> {
        let statuses = self.legacy.query_status(hosts).await?;
        Ok(statuses
            .into_iter()
            .filter(|s| s.locked && hosts.contains(&s.host))
            .map(|s| s.host)
            .collect())
    }
}
