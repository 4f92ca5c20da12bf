use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidArgument;

/// A hostname uniquely identifying one DUT.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self(hostname.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(hostname: &str) -> Self {
        Self::new(hostname)
    }
}

impl From<String> for HostId {
    fn from(hostname: String) -> Self {
        Self(hostname)
    }
}

pub type HostSet = BTreeSet<HostId>;

/// Snapshot of one host as reported by the legacy system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStatus {
    pub host: HostId,
    pub locked: bool,
    pub busy: bool,
}

/// Outcome of running one stage against a set of hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageResult {
    pub succeeded: HostSet,
    pub failed: HostSet,
}

impl StageResult {
    /// Split `input` into the hosts contained in `succeeded` and all the others.
    pub fn from_successes(input: &HostSet, succeeded: &HostSet) -> Self {
        let (succeeded, failed) = input.iter().cloned().partition(|h| succeeded.contains(h));
        Self { succeeded, failed }
    }
}

/// Which hosts move in this pass and which stay behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub transfer: HostSet,
    pub retain: HostSet,
}

impl MigrationPlan {
    pub fn new(transfer: HostSet, retain: HostSet) -> Result<Self, InvalidArgument> {
        if let Some(host) = transfer.intersection(&retain).next() {
            return Err(InvalidArgument::OverlappingPlan(host.to_string()));
        }
        Ok(Self { transfer, retain })
    }

    /// Restrict the plan to `hosts`, failing if any of them is not covered.
    pub fn restricted_to(&self, hosts: &HostSet) -> Result<Self, InvalidArgument> {
        if let Some(host) = self.transfer.intersection(&self.retain).next() {
            return Err(InvalidArgument::OverlappingPlan(host.to_string()));
        }
        if let Some(host) = hosts
            .iter()
            .find(|h| !self.transfer.contains(*h) && !self.retain.contains(*h))
        {
            return Err(InvalidArgument::UncoveredHost(host.to_string()));
        }

        Ok(Self {
            transfer: self.transfer.intersection(hosts).cloned().collect(),
            retain: self.retain.intersection(hosts).cloned().collect(),
        })
    }
}

/// Pipeline stages a host can fail at, in the order a host goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lock,
    AddToTarget,
    DroneAssignment,
    Rename,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Lock => "lock",
            Stage::AddToTarget => "add_to_target",
            Stage::DroneAssignment => "drone_assignment",
            Stage::Rename => "rename",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where every host in `plan.transfer` ended up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutSummary {
    pub migrated: HostSet,
    pub not_locked: HostSet,
    pub needs_add_to_target: HostSet,
    pub needs_drone_assignment: HostSet,
    pub needs_rename: HostSet,
}

impl DutSummary {
    fn categories(&self) -> [&HostSet; 5] {
        [
            &self.migrated,
            &self.not_locked,
            &self.needs_add_to_target,
            &self.needs_drone_assignment,
            &self.needs_rename,
        ]
    }

    /// The earliest stage that still has hosts needing attention.
    pub fn failed_step(&self) -> Option<Stage> {
        [
            (Stage::Lock, &self.not_locked),
            (Stage::AddToTarget, &self.needs_add_to_target),
            (Stage::DroneAssignment, &self.needs_drone_assignment),
            (Stage::Rename, &self.needs_rename),
        ]
        .into_iter()
        .find(|(_, hosts)| !hosts.is_empty())
        .map(|(stage, _)| stage)
    }

    pub fn is_pairwise_disjoint(&self) -> bool {
        pairwise_disjoint(&self.categories())
    }

    pub fn all_hosts(&self) -> HostSet {
        self.categories().into_iter().flatten().cloned().collect()
    }
}

/// The immutable result of one migration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub locked_success: bool,
    pub failed_step: Option<Stage>,
    pub plan: MigrationPlan,
    pub duts: DutSummary,
}

impl MigrationSummary {
    pub fn new(plan: MigrationPlan, duts: DutSummary) -> Self {
        Self {
            locked_success: duts.not_locked.is_empty(),
            failed_step: duts.failed_step(),
            plan,
            duts,
        }
    }

    /// Every category is disjoint from the others and together they are exactly `plan.transfer`.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if !self.duts.is_pairwise_disjoint() {
            violations.push("dut categories overlap".to_owned());
        }
        let accounted = self.duts.all_hosts();
        for host in self.plan.transfer.difference(&accounted) {
            violations.push(format!(
                "{host} is in the transfer group but unaccounted for"
            ));
        }
        for host in accounted.difference(&self.plan.transfer) {
            violations.push(format!(
                "{host} is accounted for but not in the transfer group"
            ));
        }
        violations
    }

    pub fn needs_attention(&self) -> HostSet {
        let mut hosts = self.duts.all_hosts();
        for host in &self.duts.migrated {
            hosts.remove(host);
        }
        hosts
    }
}

/// True when no host appears in more than one of `sets`.
pub fn pairwise_disjoint(sets: &[&HostSet]) -> bool {
    let total: usize = sets.iter().map(|s| s.len()).sum();
    let combined: BTreeSet<&HostId> = sets.iter().flat_map(|s| s.iter()).collect();
    combined.len() == total
}

pub fn host_set<I, S>(hosts: I) -> HostSet
where
    I: IntoIterator<Item = S>,
    S: Into<HostId>,
{
    hosts.into_iter().map(Into::into).collect()
}
