use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use fleet_common::types::{HostId, HostSet, HostStatus};

use crate::fleet::{
    ApplyOutcome, DeviceDescriptor, LegacyFleet, RenameDirection, TargetFleet, ToolError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    QueryStatus(HostSet),
    Lock(HostSet),
    Unlock(HostSet),
    FetchDescriptor(HostId),
    Rename(HostSet, RenameDirection),
    Add(HostId),
    AssignDrone(HostId),
    Remove(HostSet),
}

/// Behaviour of a single host in a `MockFleet`.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    pub locked: bool,
    pub unlockable: bool,
    pub hidden: bool,
    pub descriptor_fails: bool,
    pub add_fails: bool,
    pub assign_fails: bool,
    pub rename_fails: bool,
    pub in_target: bool,
    pub has_drone: bool,
    pub renamed: bool,
    // One entry is consumed per status query, the last one sticks.
    busy: VecDeque<bool>,
}

impl MockHost {
    /// A well-behaved host that is never busy.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn always_busy() -> Self {
        Self::idle().busy_pattern(vec![true])
    }

    pub fn busy_pattern(mut self, pattern: Vec<bool>) -> Self {
        self.busy = pattern.into();
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn unlockable(mut self) -> Self {
        self.unlockable = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn failing_descriptor(mut self) -> Self {
        self.descriptor_fails = true;
        self
    }

    pub fn failing_add(mut self) -> Self {
        self.add_fails = true;
        self
    }

    pub fn failing_assign(mut self) -> Self {
        self.assign_fails = true;
        self
    }

    pub fn failing_rename(mut self) -> Self {
        self.rename_fails = true;
        self
    }

    fn next_busy(&mut self) -> bool {
        if self.busy.len() > 1 {
            self.busy.pop_front().unwrap_or(false)
        } else {
            self.busy.front().copied().unwrap_or(false)
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    hosts: BTreeMap<HostId, MockHost>,
    calls: Vec<MockCall>,
}

/// An in-memory legacy and target system pair, recording every call made against it.
#[derive(Debug, Clone, Default)]
pub struct MockFleet {
    state: Arc<Mutex<MockState>>,
}

impl MockFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(self, host: &str, behaviour: MockHost) -> Self {
        self.lock_state().hosts.insert(host.into(), behaviour);
        self
    }

    pub fn with_idle_hosts(self, hosts: &[&str]) -> Self {
        hosts
            .iter()
            .fold(self, |fleet, host| fleet.with_host(host, MockHost::idle()))
    }

    /// Replace the behaviour of an existing host, keeping its lock and inventory state.
    pub fn fix_host(&self, host: &str, update: impl FnOnce(&mut MockHost)) {
        if let Some(behaviour) = self.lock_state().hosts.get_mut(&HostId::from(host)) {
            update(behaviour);
        }
    }

    pub fn host(&self, host: &str) -> Option<MockHost> {
        self.lock_state().hosts.get(&HostId::from(host)).cloned()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock_state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock_state().calls.clear();
    }

    pub fn count_calls(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.lock_state()
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    /// Hosts that were sent to the target system's add operation, in any call.
    pub fn added_hosts(&self) -> HostSet {
        self.lock_state()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Add(host) => Some(host.clone()),
                _ => None,
            })
            .collect()
    }

    /// Hosts included in any migration rename call.
    pub fn rename_attempted(&self) -> HostSet {
        self.lock_state()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Rename(hosts, RenameDirection::ForMigration) => Some(hosts.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    // Helper method to safely lock the state mutex
    fn lock_state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: MockCall) -> MutexGuard<'_, MockState> {
        let mut state = self.lock_state();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl LegacyFleet for MockFleet {
    async fn query_status(&self, hosts: &HostSet) -> Result<Vec<HostStatus>, ToolError> {
        let mut state = self.record(MockCall::QueryStatus(hosts.clone()));

        Ok(hosts
            .iter()
            .filter_map(|host| {
                let behaviour = state.hosts.get_mut(host)?;
                if behaviour.hidden {
                    return None;
                }
                Some(HostStatus {
                    host: host.clone(),
                    locked: behaviour.locked,
                    busy: behaviour.next_busy(),
                })
            })
            .collect())
    }

    async fn lock(&self, hosts: &HostSet, _reason: &str) -> Result<(), ToolError> {
        let mut state = self.record(MockCall::Lock(hosts.clone()));

        for host in hosts {
            if let Some(behaviour) = state.hosts.get_mut(host) {
                if !behaviour.unlockable {
                    behaviour.locked = true;
                }
            }
        }
        Ok(())
    }

    async fn unlock(&self, hosts: &HostSet) -> Result<Vec<HostId>, ToolError> {
        let mut state = self.record(MockCall::Unlock(hosts.clone()));

        let mut unlocked = Vec::new();
        for host in hosts {
            if let Some(behaviour) = state.hosts.get_mut(host) {
                behaviour.locked = false;
                unlocked.push(host.clone());
            }
        }
        Ok(unlocked)
    }

    async fn fetch_descriptor(&self, host: &HostId) -> Result<DeviceDescriptor, ToolError> {
        let state = self.record(MockCall::FetchDescriptor(host.clone()));

        match state.hosts.get(host) {
            Some(behaviour) if !behaviour.descriptor_fails => Ok(DeviceDescriptor {
                host: host.clone(),
                raw: format!("{{\"hostname\": \"{host}\"}}"),
            }),
            _ => Err(ToolError::NonZeroExit {
                program: "mock".to_owned(),
                exit_code: 1,
                message: format!("no descriptor for {host}"),
            }),
        }
    }

    async fn rename(
        &self,
        hosts: &HostSet,
        direction: RenameDirection,
    ) -> Result<Vec<HostId>, ToolError> {
        let mut state = self.record(MockCall::Rename(hosts.clone(), direction));

        let mut renamed = Vec::new();
        for host in hosts {
            if let Some(behaviour) = state.hosts.get_mut(host) {
                if behaviour.rename_fails {
                    continue;
                }
                behaviour.renamed = direction == RenameDirection::ForMigration;
                renamed.push(host.clone());
            }
        }
        Ok(renamed)
    }
}

#[async_trait]
impl TargetFleet for MockFleet {
    async fn add(&self, descriptor: &DeviceDescriptor) -> Result<ApplyOutcome, ToolError> {
        let mut state = self.record(MockCall::Add(descriptor.host.clone()));

        let Some(behaviour) = state.hosts.get_mut(&descriptor.host) else {
            return Ok(ApplyOutcome::failed("unknown host"));
        };
        Ok(if behaviour.add_fails {
            ApplyOutcome::failed("inventory rejected the device")
        } else if behaviour.in_target {
            ApplyOutcome::AlreadyInDesiredState
        } else {
            behaviour.in_target = true;
            ApplyOutcome::Applied
        })
    }

    async fn assign_drone(&self, host: &HostId) -> Result<ApplyOutcome, ToolError> {
        let mut state = self.record(MockCall::AssignDrone(host.clone()));

        let Some(behaviour) = state.hosts.get_mut(host) else {
            return Ok(ApplyOutcome::failed("unknown host"));
        };
        Ok(if behaviour.assign_fails {
            ApplyOutcome::failed("no drone available")
        } else if !behaviour.in_target {
            ApplyOutcome::failed("host is not in the inventory")
        } else if behaviour.has_drone {
            ApplyOutcome::AlreadyInDesiredState
        } else {
            behaviour.has_drone = true;
            ApplyOutcome::Applied
        })
    }

    async fn remove(&self, hosts: &HostSet, _bug: &str) -> Result<ApplyOutcome, ToolError> {
        let mut state = self.record(MockCall::Remove(hosts.clone()));

        for host in hosts {
            if let Some(behaviour) = state.hosts.get_mut(host) {
                behaviour.in_target = false;
                behaviour.has_drone = false;
            }
        }
        Ok(ApplyOutcome::Applied)
    }
}
