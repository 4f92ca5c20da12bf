//! Adapter for the target system's `skylab` command-line tool.
use std::path::PathBuf;

use async_trait::async_trait;
use fleet_common::types::{HostId, HostSet};
use tracing::debug;

use super::command::{run, run_with_tempfile, CommandOutput, TEMPFILE};
use crate::fleet::{ApplyOutcome, DeviceDescriptor, TargetFleet, ToolError};

const ALREADY_PRESENT: &str = "nothing to commit";
const ALREADY_ASSIGNED: &str = "already assigned";

pub struct SkylabClient {
    exe: PathBuf,
}

impl SkylabClient {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }
}

#[async_trait]
impl TargetFleet for SkylabClient {
    async fn add(&self, descriptor: &DeviceDescriptor) -> Result<ApplyOutcome, ToolError> {
        let output = run_with_tempfile(
            &self.exe,
            &[
                "add-dut",
                "-skip-image-download",
                "-skip-install-firmware",
                "-skip-install-os",
                "-specs-file",
                TEMPFILE,
            ],
            [descriptor.raw.as_str()],
        )
        .await?;

        let outcome = outcome(&output, ALREADY_PRESENT);
        debug!(host = %descriptor.host, ?outcome, "add-dut finished");
        Ok(outcome)
    }

    async fn assign_drone(&self, host: &HostId) -> Result<ApplyOutcome, ToolError> {
        let output = run(&self.exe, &["assign-dut", "--", host.as_str()]).await?;

        let outcome = outcome(&output, ALREADY_ASSIGNED);
        debug!(%host, ?outcome, "assign-dut finished");
        Ok(outcome)
    }

    async fn remove(&self, hosts: &HostSet, bug: &str) -> Result<ApplyOutcome, ToolError> {
        let mut args = vec!["remove-duts", "-delete", "-bug", bug];
        args.extend(hosts.iter().map(HostId::as_str));

        let output = run(&self.exe, &args).await?;
        Ok(outcome(&output, ""))
    }
}

/// Map a tool invocation to an outcome. `already` is the message the tool prints when there
/// was nothing to do, which it may report with a non-zero exit status.
fn outcome(output: &CommandOutput, already: &str) -> ApplyOutcome {
    if !already.is_empty() && output.mentions(already) {
        ApplyOutcome::AlreadyInDesiredState
    } else if output.success() {
        ApplyOutcome::Applied
    } else {
        ApplyOutcome::failed(output.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fake_tool;

    fn output(exit_code: i32, stdout: &[&str]) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stderr: vec![],
        }
    }

    #[test]
    fn test_add_outcomes() {
        let applied = outcome(&output(0, &["ok"]), ALREADY_PRESENT);
        let present = outcome(&output(1, &["Nothing to commit"]), ALREADY_PRESENT);
        let failed = outcome(&output(2, &["inventory is down"]), ALREADY_PRESENT);

        assert_eq!(applied, ApplyOutcome::Applied);
        assert_eq!(present, ApplyOutcome::AlreadyInDesiredState);
        assert_eq!(failed, ApplyOutcome::failed("inventory is down"));
    }

    #[test]
    fn test_assign_outcomes() {
        let already = outcome(&output(1, &["already assigned"]), ALREADY_ASSIGNED);
        let applied = outcome(&output(0, &[]), ALREADY_ASSIGNED);
        let failed = outcome(&output(1, &[]), ALREADY_ASSIGNED);

        assert_eq!(already, ApplyOutcome::AlreadyInDesiredState);
        assert_eq!(applied, ApplyOutcome::Applied);
        assert_eq!(failed, ApplyOutcome::failed("exit status 1"));
    }

    #[test]
    fn test_remove_has_no_already_state() {
        assert_eq!(outcome(&output(0, &[]), ""), ApplyOutcome::Applied);
        assert_eq!(
            outcome(&output(1, &["bad bug"]), ""),
            ApplyOutcome::failed("bad bug")
        );
    }

    #[tokio::test]
    async fn test_add_passes_descriptor_through_specs_file() {
        // Echo the specs file back as a failure so the reason carries its contents
        let exe = fake_tool(r#"for last; do :; done; cat "$last" >&2; exit 1"#);
        let client = SkylabClient::new(exe.to_path_buf());
        let descriptor = DeviceDescriptor {
            host: HostId::new("a"),
            raw: r#"{"hostname": "a"}"#.to_owned(),
        };

        let outcome = client.add(&descriptor).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::failed(r#"{"hostname": "a"}"#));
    }

    #[tokio::test]
    async fn test_assign_already_assigned() {
        let exe = fake_tool("echo \"$3 is already assigned to drone-1\"; exit 1");
        let client = SkylabClient::new(exe.to_path_buf());

        let outcome = client.assign_drone(&HostId::new("a")).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::AlreadyInDesiredState);
    }
}
