use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::fleet::ToolError;

/// Argument replaced with the path of the temporary input file.
pub const TEMPFILE: &str = "{tempfile}";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Whether `needle` appears anywhere in the output, case-insensitively.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.stdout
            .iter()
            .chain(&self.stderr)
            .any(|line| line.to_lowercase().contains(&needle))
    }

    /// A short description of what went wrong, for logs and failure reasons.
    pub fn reason(&self) -> String {
        self.stderr
            .iter()
            .chain(self.stdout.iter().rev())
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("exit status {}", self.exit_code))
    }
}

/// Run `program` to completion. Dropping the returned future kills the child.
pub async fn run(program: &Path, args: &[&str]) -> Result<CommandOutput, ToolError> {
    debug!(program = %program.display(), ?args, "running command");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ToolError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: lines(&output.stdout),
        stderr: lines(&output.stderr),
    })
}

/// Run `program` with `contents` written one item per line to a temporary file, whose path
/// replaces every `TEMPFILE` argument. The file is removed once the command is done or the
/// future is dropped.
pub async fn run_with_tempfile<I, S>(
    program: &Path,
    args: &[&str],
    contents: I,
) -> Result<CommandOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let io_error = |source: std::io::Error| ToolError::Io {
        program: program.display().to_string(),
        source,
    };

    let mut body = String::new();
    for line in contents {
        body.push_str(line.as_ref());
        if !body.ends_with('\n') {
            body.push('\n');
        }
    }

    let mut file = tempfile::Builder::new()
        .prefix("fleet-migrator-")
        .tempfile()
        .map_err(io_error)?;
    file.write_all(body.as_bytes()).map_err(io_error)?;
    let path = file.into_temp_path();

    let path_arg = path.display().to_string();
    let args: Vec<&str> = args
        .iter()
        .map(|arg| {
            if *arg == TEMPFILE {
                path_arg.as_str()
            } else {
                *arg
            }
        })
        .collect();
    let result = run(program, &args).await;

    if let Err(e) = path.close() {
        warn!(path = %path_arg, error = %e, "failed to remove temporary file");
    }
    result
}

fn lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_owned)
        .collect()
}
