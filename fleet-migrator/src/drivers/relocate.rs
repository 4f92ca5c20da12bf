use std::sync::Arc;

use fleet_common::retry::RetryPolicy;
use fleet_common::types::{HostId, HostSet};
use tracing::{debug, info, warn};

use crate::error::MigrationError;
use crate::fleet::{ApplyOutcome, LegacyFleet, TargetFleet};
use crate::metrics_consts::ASSIGN_ATTEMPTS;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocateResult {
    pub succeeded: HostSet,
    pub needs_add_to_target: HostSet,
    pub needs_drone_assignment: HostSet,
}

impl RelocateResult {
    pub fn failed(&self) -> HostSet {
        self.needs_add_to_target
            .union(&self.needs_drone_assignment)
            .cloned()
            .collect()
    }
}

/// Copies hosts into the target system and gives each one a drone.
pub struct RelocateDriver {
    legacy: Arc<dyn LegacyFleet>,
    target: Arc<dyn TargetFleet>,
    assign_policy: RetryPolicy,
}

impl RelocateDriver {
    pub fn new(
        legacy: Arc<dyn LegacyFleet>,
        target: Arc<dyn TargetFleet>,
        assign_policy: RetryPolicy,
    ) -> Self {
        Self {
            legacy,
            target,
            assign_policy,
        }
    }

    /// Relocate every host in `hosts`.
    ///
    /// Failing to fetch a descriptor aborts the whole call, since it means the legacy
    /// system is unreachable rather than that one host is misbehaving.
    pub async fn run(&self, hosts: &HostSet) -> Result<RelocateResult, MigrationError> {
        let mut result = RelocateResult::default();

        for host in hosts {
            let descriptor = self.legacy.fetch_descriptor(host).await?;

            match self.target.add(&descriptor).await? {
                ApplyOutcome::Failed { reason } => {
                    warn!(%host, %reason, "failed to add host to the target system");
                    result.needs_add_to_target.insert(host.clone());
                    continue;
                }
                outcome => debug!(%host, ?outcome, "host is in the target system"),
            }

            if self.assign(host).await? {
                result.succeeded.insert(host.clone());
            } else {
                result.needs_drone_assignment.insert(host.clone());
            }
        }

        info!(
            relocated = result.succeeded.len(),
            failed = result.failed().len(),
            "relocation finished"
        );
        Ok(result)
    }

    async fn assign(&self, host: &HostId) -> Result<bool, MigrationError> {
        for attempt in 1..=self.assign_policy.max_attempts {
            metrics::counter!(ASSIGN_ATTEMPTS).increment(1);

            match self.target.assign_drone(host).await? {
                ApplyOutcome::Failed { reason } => {
                    warn!(%host, attempt, %reason, "drone assignment failed");
                    if self.assign_policy.should_retry(attempt) {
                        super::backoff(&self.assign_policy, attempt).await;
                    }
                }
                outcome => {
                    debug!(%host, ?outcome, "host has a drone");
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}
