use std::sync::Arc;
use std::time::Duration;

use fleet_common::retry::RetryPolicy;
use fleet_common::types::{HostSet, MigrationSummary};
use fleet_migrator::mock::MockFleet;
use fleet_migrator::orchestrator::{MigrationSettings, Orchestrator};
use fleet_migrator::plan::{PlanSource, StaticPlan};

pub fn settings() -> MigrationSettings {
    MigrationSettings {
        reason: "move to the new lab".to_owned(),
        max_duration: Duration::from_secs(10 * 60),
        poll_interval: Duration::from_secs(30),
        min_ready_intervals: 2,
        lock_retry: RetryPolicy::immediate(2),
        assign_retry: RetryPolicy::build(3, Duration::from_secs(1)).provide(),
        rename_retry: RetryPolicy::immediate(3),
        ..Default::default()
    }
}

pub fn orchestrator(
    fleet: &MockFleet,
    hosts: &HostSet,
    settings: MigrationSettings,
) -> Orchestrator {
    let planner = Arc::new(StaticPlan::transfer_all(hosts.clone()));
    orchestrator_with_plan(fleet, planner, settings)
}

pub fn orchestrator_with_plan(
    fleet: &MockFleet,
    planner: Arc<dyn PlanSource>,
    settings: MigrationSettings,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(fleet.clone()),
        Arc::new(fleet.clone()),
        planner,
        settings,
    )
}

/// Every host in the transfer group lands in exactly one category.
pub fn assert_consistent(summary: &MigrationSummary) {
    assert!(
        summary.violations().is_empty(),
        "inconsistent summary: {:?}",
        summary.violations()
    );
    assert!(summary.plan.transfer.is_disjoint(&summary.plan.retain));
}

/// Status script for a host whose first two status reads happen while locking.
pub fn after_locking(readiness: &[bool]) -> Vec<bool> {
    let mut pattern = vec![false, false];
    pattern.extend_from_slice(readiness);
    pattern
}
