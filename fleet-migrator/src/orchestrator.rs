use std::sync::Arc;
use std::time::Duration;

use fleet_common::error::InvalidArgument;
use fleet_common::retry::RetryPolicy;
use fleet_common::types::{DutSummary, HostSet, MigrationPlan, MigrationSummary, Stage};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::drivers::{LockDriver, RelocateDriver, RenameDriver};
use crate::error::MigrationError;
use crate::fleet::{LegacyFleet, TargetFleet};
use crate::metrics_consts::*;
use crate::plan::PlanSource;
use crate::readiness::ReadinessMonitor;

#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Lock reason recorded in the legacy system.
    pub reason: String,
    /// Fraction of the hosts to move in this pass.
    pub ratio: f64,
    /// Skip waiting for hosts to go idle.
    pub migrate_immediately: bool,
    /// How long to wait for hosts to go idle before migrating them regardless.
    pub max_duration: Duration,
    pub poll_interval: Duration,
    /// Consecutive idle polls required before a host is migrated.
    pub min_ready_intervals: u32,
    pub lock_retry: RetryPolicy,
    pub assign_retry: RetryPolicy,
    pub rename_retry: RetryPolicy,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            reason: "migration to the new fleet system".to_owned(),
            ratio: 1.0,
            migrate_immediately: false,
            max_duration: Duration::from_secs(60 * 60),
            poll_interval: Duration::from_secs(30),
            min_ready_intervals: 10,
            lock_retry: RetryPolicy::default(),
            assign_retry: RetryPolicy::default(),
            rename_retry: RetryPolicy::default(),
        }
    }
}

/// Drives one migration pass from planning to summary.
///
/// A pass never fails because individual hosts misbehave: those hosts are reported in the
/// summary under the stage they got stuck at, and the pass can simply be run again. Only bad
/// input or an unreachable external system abort it.
pub struct Orchestrator {
    legacy: Arc<dyn LegacyFleet>,
    planner: Arc<dyn PlanSource>,
    settings: MigrationSettings,
    lock: LockDriver,
    relocate: RelocateDriver,
    rename: RenameDriver,
}

impl Orchestrator {
    pub fn new(
        legacy: Arc<dyn LegacyFleet>,
        target: Arc<dyn TargetFleet>,
        planner: Arc<dyn PlanSource>,
        settings: MigrationSettings,
    ) -> Self {
        let lock = LockDriver::new(legacy.clone(), settings.lock_retry.clone());
        let relocate = RelocateDriver::new(legacy.clone(), target, settings.assign_retry.clone());
        let rename = RenameDriver::new(legacy.clone(), settings.rename_retry.clone());

        Self {
            legacy,
            planner,
            settings,
            lock,
            relocate,
            rename,
        }
    }

    /// Run a pass over `hosts`.
    ///
    /// Hosts that `previous` reports as migrated are left alone, so feeding the summary of
    /// a failed pass back in only retries the stragglers.
    pub async fn run(
        &self,
        hosts: &HostSet,
        previous: Option<&MigrationSummary>,
    ) -> Result<MigrationSummary, MigrationError> {
        self.validate()?;

        let started = Instant::now();
        metrics::counter!(PASS_STARTS).increment(1);

        let candidates = match previous {
            Some(previous) => {
                let candidates: HostSet =
                    hosts.difference(&previous.duts.migrated).cloned().collect();
                info!(
                    skipped = hosts.len() - candidates.len(),
                    "skipping hosts migrated by a previous pass"
                );
                candidates
            }
            None => hosts.clone(),
        };

        let plan = self.planner.plan(&candidates, self.settings.ratio).await?;
        metrics::counter!(HOSTS_PLANNED).increment(plan.transfer.len() as u64);
        info!(
            transfer = plan.transfer.len(),
            retain = plan.retain.len(),
            "planned migration pass"
        );

        let mut duts = DutSummary::default();

        let locked = self.lock_hosts(&plan.transfer, &mut duts).await?;

        let mut leftovers = if self.settings.migrate_immediately {
            absorb(&mut duts, self.migrate(&locked).await?);
            HostSet::new()
        } else {
            self.migrate_when_ready(&locked, &mut duts).await?
        };
        leftovers.extend(staged_failures(&duts));

        if !leftovers.is_empty() {
            info!(
                hosts = leftovers.len(),
                "migrating remaining hosts unconditionally"
            );
            clear_staged_failures(&mut duts, &leftovers);
            absorb(&mut duts, self.migrate(&leftovers).await?);
        }

        let summary = self.summarize(plan, duts);
        metrics::histogram!(PASS_TIME).record(started.elapsed().as_secs_f64());
        Ok(summary)
    }

    fn validate(&self) -> Result<(), MigrationError> {
        let settings = &self.settings;
        if settings.reason.trim().is_empty() {
            return Err(InvalidArgument::MissingReason.into());
        }
        if !settings.ratio.is_finite() || !(0.0..=1.0).contains(&settings.ratio) {
            return Err(InvalidArgument::InvalidRatio(settings.ratio).into());
        }
        if !settings.migrate_immediately && settings.poll_interval.is_zero() {
            return Err(MigrationError::invalid_setting(
                "poll interval must be positive when waiting for hosts to become ready",
            ));
        }
        if !settings.migrate_immediately && settings.min_ready_intervals == 0 {
            return Err(MigrationError::invalid_setting(
                "hosts must be seen idle at least once when waiting for them to become ready",
            ));
        }
        for (stage, policy) in [
            (Stage::Lock, &settings.lock_retry),
            (Stage::DroneAssignment, &settings.assign_retry),
            (Stage::Rename, &settings.rename_retry),
        ] {
            if policy.max_attempts == 0 {
                return Err(MigrationError::invalid_setting(format!(
                    "{stage} must be attempted at least once"
                )));
            }
        }
        Ok(())
    }

    /// Lock the transfer group and return the hosts confirmed locked.
    async fn lock_hosts(
        &self,
        transfer: &HostSet,
        duts: &mut DutSummary,
    ) -> Result<HostSet, MigrationError> {
        if transfer.is_empty() {
            return Ok(HostSet::new());
        }

        self.lock.run(transfer, &self.settings.reason).await?;

        // Whatever the lock attempts reported, only trust a fresh status read.
        let verified = self.lock.verify_locked(transfer).await?;
        if !verified.failed.is_empty() {
            warn!(
                hosts = verified.failed.len(),
                "hosts are not locked and will not be migrated in this pass"
            );
        }
        duts.not_locked = verified.failed;

        Ok(verified.succeeded)
    }

    /// Migrate hosts as they go idle, until they all have or time runs out.
    ///
    /// Returns the hosts that never became ready.
    async fn migrate_when_ready(
        &self,
        hosts: &HostSet,
        duts: &mut DutSummary,
    ) -> Result<HostSet, MigrationError> {
        let deadline = Instant::now() + self.settings.max_duration;
        let mut monitor = ReadinessMonitor::new(hosts, self.settings.min_ready_intervals);

        while !monitor.is_done() && Instant::now() < deadline {
            metrics::counter!(READINESS_TICKS).increment(1);

            let statuses = self.legacy.query_status(&monitor.pending()).await?;
            let tick = monitor.observe(&statuses);

            if !tick.ready.is_empty() {
                info!(
                    ready = tick.ready.len(),
                    pending = tick.pending.len(),
                    "migrating hosts that became ready"
                );
                absorb(duts, self.migrate(&tick.ready).await?);
            }

            if monitor.is_done() {
                break;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        let timed_out = monitor.pending();
        if !timed_out.is_empty() {
            warn!(
                hosts = timed_out.len(),
                "hosts did not become ready before the deadline"
            );
            metrics::counter!(READINESS_TIMEOUTS).increment(timed_out.len() as u64);
        }
        Ok(timed_out)
    }

    /// Relocate `hosts` and rename the ones that made it.
    async fn migrate(&self, hosts: &HostSet) -> Result<DutSummary, MigrationError> {
        if hosts.is_empty() {
            return Ok(DutSummary::default());
        }

        let relocated = self.relocate.run(hosts).await?;
        let renamed = self.rename.run(&relocated.succeeded).await?;

        Ok(DutSummary {
            migrated: renamed.succeeded,
            not_locked: HostSet::new(),
            needs_add_to_target: relocated.needs_add_to_target,
            needs_drone_assignment: relocated.needs_drone_assignment,
            needs_rename: renamed.failed,
        })
    }

    fn summarize(&self, plan: MigrationPlan, duts: DutSummary) -> MigrationSummary {
        let summary = MigrationSummary::new(plan, duts);

        for violation in summary.violations() {
            error!(%violation, "migration summary is inconsistent");
        }

        metrics::counter!(HOSTS_MIGRATED).increment(summary.duts.migrated.len() as u64);
        for (stage, hosts) in [
            (Stage::Lock, &summary.duts.not_locked),
            (Stage::AddToTarget, &summary.duts.needs_add_to_target),
            (Stage::DroneAssignment, &summary.duts.needs_drone_assignment),
            (Stage::Rename, &summary.duts.needs_rename),
        ] {
            metrics::counter!(HOSTS_STUCK, "stage" => stage.as_str()).increment(hosts.len() as u64);
        }

        info!(
            migrated = summary.duts.migrated.len(),
            needs_attention = summary.needs_attention().len(),
            failed_step = ?summary.failed_step,
            "migration pass finished"
        );
        summary
    }
}

fn absorb(duts: &mut DutSummary, outcome: DutSummary) {
    let DutSummary {
        migrated,
        not_locked,
        needs_add_to_target,
        needs_drone_assignment,
        needs_rename,
    } = outcome;

    duts.migrated.extend(migrated);
    duts.not_locked.extend(not_locked);
    duts.needs_add_to_target.extend(needs_add_to_target);
    duts.needs_drone_assignment.extend(needs_drone_assignment);
    duts.needs_rename.extend(needs_rename);
}

fn staged_failures(duts: &DutSummary) -> HostSet {
    duts.needs_add_to_target
        .iter()
        .chain(&duts.needs_drone_assignment)
        .chain(&duts.needs_rename)
        .cloned()
        .collect()
}

fn clear_staged_failures(duts: &mut DutSummary, hosts: &HostSet) {
    for host in hosts {
        duts.needs_add_to_target.remove(host);
        duts.needs_drone_assignment.remove(host);
        duts.needs_rename.remove(host);
    }
}
