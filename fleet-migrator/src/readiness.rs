//! Tracks how long each host has been idle before letting it migrate.
use std::collections::HashMap;

use fleet_common::types::{HostId, HostSet, HostStatus};

/// What a single poll changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadinessTick {
    /// Hosts that reached the threshold on this poll.
    pub ready: HostSet,
    /// Hosts still being watched.
    pub pending: HostSet,
}

/// Counts consecutive non-busy observations per host.
///
/// A busy observation resets the host's counter to zero, so a host needs
/// `min_ready_intervals` idle polls in a row to become ready. Ready hosts stop being
/// watched. Hosts missing from a poll keep their counter. A host seen busy is never ready,
/// whatever the threshold.
#[derive(Debug)]
pub struct ReadinessMonitor {
    min_ready_intervals: u32,
    counters: HashMap<HostId, u32>,
}

impl ReadinessMonitor {
    pub fn new(hosts: &HostSet, min_ready_intervals: u32) -> Self {
        Self {
            min_ready_intervals,
            counters: hosts.iter().map(|h| (h.clone(), 0)).collect(),
        }
    }

    pub fn observe(&mut self, statuses: &[HostStatus]) -> ReadinessTick {
        let mut ready = HostSet::new();

        for status in statuses {
            let Some(counter) = self.counters.get_mut(&status.host) else {
                continue;
            };

            if status.busy {
                *counter = 0;
            } else {
                *counter += 1;
            }

            if !status.busy && *counter >= self.min_ready_intervals {
                ready.insert(status.host.clone());
            }
        }

        for host in &ready {
            self.counters.remove(host);
        }

        ReadinessTick {
            ready,
            pending: self.pending(),
        }
    }

    pub fn pending(&self) -> HostSet {
        self.counters.keys().cloned().collect()
    }

    pub fn is_done(&self) -> bool {
        self.counters.is_empty()
    }

    #[cfg(test)]
    fn counter(&self, host: &HostId) -> Option<u32> {
        self.counters.get(host).copied()
    }
}
