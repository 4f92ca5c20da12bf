//! Contracts for the two external fleet-management systems.
//!
//! The orchestrator only ever talks to the legacy and target systems through these traits.
//! Adapters for the real command-line tools live in `crate::tools`, an in-memory fleet for
//! tests lives in `crate::mock`.
use async_trait::async_trait;
use fleet_common::types::{HostId, HostSet, HostStatus};
use thiserror::Error;

/// Errors raised by a collaborator call itself, as opposed to a host failing a stage.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("io error while talking to {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with status {exit_code}: {message}")]
    NonZeroExit {
        program: String,
        exit_code: i32,
        message: String,
    },
    #[error("could not parse output of {program}: {message}")]
    Parse { program: String, message: String },
}

/// Result of asking a system to move a host into some state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The host was already in the requested state; nothing changed.
    AlreadyInDesiredState,
    Applied,
    Failed { reason: String },
}

impl ApplyOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ApplyOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// Full record of a device as exported by the legacy system, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub host: HostId,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameDirection {
    /// Mark the legacy entry as migrated so no more work is scheduled on it.
    ForMigration,
    /// Undo a previous migration rename.
    ForRollback,
}

#[async_trait]
pub trait LegacyFleet: Send + Sync {
    /// Current status of `hosts`. Hosts missing from the result are simply unknown.
    async fn query_status(&self, hosts: &HostSet) -> Result<Vec<HostStatus>, ToolError>;

    /// Ask for `hosts` to be locked. Whether it worked is found out through `query_status`.
    async fn lock(&self, hosts: &HostSet, reason: &str) -> Result<(), ToolError>;

    /// Unlock `hosts`, returning those that were unlocked.
    async fn unlock(&self, hosts: &HostSet) -> Result<Vec<HostId>, ToolError>;

    async fn fetch_descriptor(&self, host: &HostId) -> Result<DeviceDescriptor, ToolError>;

    /// Rename `hosts`, returning the original ids of those that were renamed.
    async fn rename(
        &self,
        hosts: &HostSet,
        direction: RenameDirection,
    ) -> Result<Vec<HostId>, ToolError>;
}

#[async_trait]
pub trait TargetFleet: Send + Sync {
    async fn add(&self, descriptor: &DeviceDescriptor) -> Result<ApplyOutcome, ToolError>;

    /// Assign `host` to a drone. A host that already has a drone is `AlreadyInDesiredState`.
    async fn assign_drone(&self, host: &HostId) -> Result<ApplyOutcome, ToolError>;

    async fn remove(&self, hosts: &HostSet, bug: &str) -> Result<ApplyOutcome, ToolError>;
}
