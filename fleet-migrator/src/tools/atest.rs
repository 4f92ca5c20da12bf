//! Adapter for the legacy `atest` command-line tool.
use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use fleet_common::types::{HostId, HostSet, HostStatus};
use tracing::debug;

use super::command::{run, run_with_tempfile, TEMPFILE};
use crate::fleet::{DeviceDescriptor, LegacyFleet, RenameDirection, ToolError};

/// Suffix the legacy system appends to hostnames renamed for migration.
pub const MIGRATED_SUFFIX: &str = "-migrated-do-not-use";

// Hosts in these states are in the middle of a task
const BUSY_STATUSES: [&str; 2] = ["Running", "Provisioning"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Bool(bool),
    Null,
    Text(String),
}

impl Field {
    fn parse(value: &str) -> Self {
        match value {
            "True" => Field::Bool(true),
            "False" => Field::Bool(false),
            "None" => Field::Null,
            other => Field::Text(other.to_owned()),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            _ => None,
        }
    }
}

pub type Record = HashMap<String, Field>;

pub struct AtestClient {
    exe: PathBuf,
}

impl AtestClient {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    fn program(&self) -> String {
        self.exe.display().to_string()
    }
}

#[async_trait]
impl LegacyFleet for AtestClient {
    async fn query_status(&self, hosts: &HostSet) -> Result<Vec<HostStatus>, ToolError> {
        let output = run_with_tempfile(
            &self.exe,
            &["host", "list", "--parse", "-M", TEMPFILE],
            hosts.iter().map(HostId::as_str),
        )
        .await?;

        Ok(parse_brief_info(&output.stdout)
            .iter()
            .filter_map(host_status)
            .filter(|status| hosts.contains(&status.host))
            .collect())
    }

    async fn lock(&self, hosts: &HostSet, reason: &str) -> Result<(), ToolError> {
        let output = run_with_tempfile(
            &self.exe,
            &["host", "mod", "--lock", "-r", reason, "-M", TEMPFILE],
            hosts.iter().map(HostId::as_str),
        )
        .await?;

        // Locking an already locked host fails, the status query tells us the truth.
        if !output.success() {
            debug!(
                exit_code = output.exit_code,
                reason = %output.reason(),
                "lock reported an error"
            );
        }
        Ok(())
    }

    async fn unlock(&self, hosts: &HostSet) -> Result<Vec<HostId>, ToolError> {
        let output = run_with_tempfile(
            &self.exe,
            &["host", "mod", "--unlock", "-M", TEMPFILE],
            hosts.iter().map(HostId::as_str),
        )
        .await?;

        Ok(parse_unlock(&output.stdout))
    }

    async fn fetch_descriptor(&self, host: &HostId) -> Result<DeviceDescriptor, ToolError> {
        let output = run(&self.exe, &["host", "statjson", "--", host.as_str()]).await?;
        if !output.success() {
            return Err(ToolError::NonZeroExit {
                program: self.program(),
                exit_code: output.exit_code,
                message: output.reason(),
            });
        }
        if output.stdout.iter().all(|line| line.trim().is_empty()) {
            return Err(ToolError::Parse {
                program: self.program(),
                message: format!("empty descriptor for {host}"),
            });
        }

        Ok(DeviceDescriptor {
            host: host.clone(),
            raw: output.stdout.join("\n"),
        })
    }

    async fn rename(
        &self,
        hosts: &HostSet,
        direction: RenameDirection,
    ) -> Result<Vec<HostId>, ToolError> {
        let (flag, names): (&str, Vec<String>) = match direction {
            RenameDirection::ForMigration => (
                "--for-migration",
                hosts.iter().map(HostId::to_string).collect(),
            ),
            RenameDirection::ForRollback => (
                "--for-rollback",
                hosts
                    .iter()
                    .map(|h| format!("{h}{MIGRATED_SUFFIX}"))
                    .collect(),
            ),
        };

        let output = run_with_tempfile(
            &self.exe,
            &[
                "host",
                "rename",
                "--no-confirmation",
                flag,
                "--parse",
                "-M",
                TEMPFILE,
            ],
            &names,
        )
        .await?;

        Ok(parse_rename(&output.stdout, direction))
    }
}

/// Parse `host list --parse` output: one host per line as `|`-separated `key=value` pairs.
///
/// Lines with fewer than two fields are not host descriptions and are skipped. The trailing
/// `Labels=` field is dropped.
pub fn parse_brief_info(lines: &[String]) -> Vec<Record> {
    lines
        .iter()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut fields: Vec<&str> = line.split('|').collect();
            if fields.len() < 2 {
                return None;
            }
            if fields.last().is_some_and(|f| f.starts_with("Labels=")) {
                fields.pop();
            }

            Some(
                fields
                    .into_iter()
                    .map(|field| {
                        let (key, value) = field.split_once('=').unwrap_or((field, ""));
                        (key.to_owned(), Field::parse(value))
                    })
                    .collect(),
            )
        })
        .collect()
}

pub fn host_status(record: &Record) -> Option<HostStatus> {
    let host = record.get("Host")?.as_str()?;
    let locked = record.get("Locked") == Some(&Field::Bool(true));
    let busy = record
        .get("Status")
        .and_then(Field::as_str)
        .is_some_and(|status| BUSY_STATUSES.contains(&status));

    Some(HostStatus {
        host: HostId::new(host),
        locked,
        busy,
    })
}

/// Parse `host rename` output lines of the form `<from> to <to>` into the original hostnames.
pub fn parse_rename(lines: &[String], direction: RenameDirection) -> Vec<HostId> {
    lines
        .iter()
        .filter_map(|line| {
            let row: Vec<&str> = line.split_whitespace().collect();
            match row.as_slice() {
                [from, "to", to] => Some(match direction {
                    RenameDirection::ForMigration => HostId::new(*from),
                    RenameDirection::ForRollback => HostId::new(*to),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Parse `host mod --unlock` output: a header line followed by one hostname per line.
pub fn parse_unlock(lines: &[String]) -> Vec<HostId> {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.to_lowercase().starts_with("unlocked host"))
        .map(HostId::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use fleet_common::types::host_set;

    use super::*;
    use crate::tools::fake_tool;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_brief_info() {
        let records = parse_brief_info(&lines(&[
            "Host=a|Status=Ready|Locked=True|Locked by=None|Labels=board:x",
            "",
            "garbage",
            "Host=b|Status=Running|Locked=False",
        ]));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Host"], Field::Text("a".to_owned()));
        assert_eq!(records[0]["Locked"], Field::Bool(true));
        assert_eq!(records[0]["Locked by"], Field::Null);
        assert!(!records[0].contains_key("Labels"));
        assert_eq!(records[1]["Locked"], Field::Bool(false));
    }

    #[test]
    fn test_host_status() {
        let records = parse_brief_info(&lines(&[
            "Host=a|Status=Ready|Locked=True",
            "Host=b|Status=Provisioning|Locked=False",
            "Host=c|Status=Running|Locked=True",
            "Status=Ready|Locked=True",
        ]));
        let statuses: Vec<HostStatus> = records.iter().filter_map(host_status).collect();

        assert_eq!(
            statuses,
            vec![
                HostStatus {
                    host: "a".into(),
                    locked: true,
                    busy: false
                },
                HostStatus {
                    host: "b".into(),
                    locked: false,
                    busy: true
                },
                HostStatus {
                    host: "c".into(),
                    locked: true,
                    busy: true
                },
            ]
        );
    }

    #[test]
    fn test_parse_rename_for_migration() {
        let renamed = parse_rename(
            &lines(&[
                "Successfully renamed:",
                "a to a-migrated-do-not-use",
                "b into c",
                "  d   to   d-migrated-do-not-use  ",
            ]),
            RenameDirection::ForMigration,
        );

        assert_eq!(renamed, vec![HostId::new("a"), HostId::new("d")]);
    }

    #[test]
    fn test_parse_rename_for_rollback() {
        let renamed = parse_rename(
            &lines(&["a-migrated-do-not-use to a"]),
            RenameDirection::ForRollback,
        );

        assert_eq!(renamed, vec![HostId::new("a")]);
    }

    #[test]
    fn test_parse_unlock() {
        let unlocked = parse_unlock(&lines(&["Unlocked Hosts:", "    A", "\tB", ""]));
        assert_eq!(unlocked, vec![HostId::new("A"), HostId::new("B")]);
    }

    #[tokio::test]
    async fn test_query_status_reads_listed_hosts() {
        let exe = fake_tool(
            "echo 'Host=a|Status=Running|Locked=True'\n\
             echo 'Host=z|Status=Ready|Locked=False'",
        );
        let client = AtestClient::new(exe.to_path_buf());

        let statuses = client.query_status(&host_set(["a", "b"])).await.unwrap();

        assert_eq!(
            statuses,
            vec![HostStatus {
                host: "a".into(),
                locked: true,
                busy: true
            }]
        );
    }

    #[tokio::test]
    async fn test_lock_ignores_tool_errors() {
        let exe = fake_tool("echo 'host a is already locked' >&2; exit 1");
        let client = AtestClient::new(exe.to_path_buf());

        let result = client.lock(&host_set(["a"]), "move to the new lab").await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_descriptor_fails_on_nonzero_exit() {
        let exe = fake_tool("echo 'no such host' >&2; exit 2");
        let client = AtestClient::new(exe.to_path_buf());

        let result = client.fetch_descriptor(&HostId::new("a")).await;

        assert!(matches!(
            result,
            Err(ToolError::NonZeroExit { exit_code: 2, .. })
        ));
        assert!(result.unwrap_err().to_string().ends_with("no such host"));
    }

    #[tokio::test]
    async fn test_fetch_descriptor_rejects_empty_output() {
        let exe = fake_tool("exit 0");
        let client = AtestClient::new(exe.to_path_buf());

        let result = client.fetch_descriptor(&HostId::new("a")).await;

        assert!(matches!(result, Err(ToolError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_fetch_descriptor_passes_output_through() {
        let exe = fake_tool(r#"echo "{\"hostname\": \"$4\"}""#);
        let client = AtestClient::new(exe.to_path_buf());

        let descriptor = client.fetch_descriptor(&HostId::new("a")).await.unwrap();

        assert_eq!(descriptor.host, HostId::new("a"));
        assert_eq!(descriptor.raw, r#"{"hostname": "a"}"#);
    }
}
