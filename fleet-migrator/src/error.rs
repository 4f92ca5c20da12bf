use std::path::PathBuf;

use fleet_common::error::InvalidArgument;
use thiserror::Error;

use crate::fleet::ToolError;

/// Errors that abort a migration or rollback pass. Hosts failing an individual stage are
/// never reported here, they end up in the summary instead.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
    #[error("an external tool failed")]
    ExternalTool(#[from] ToolError),
    #[error("failed to read plan file {path}")]
    PlanFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse plan file {path}")]
    PlanFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl MigrationError {
    pub fn invalid_setting(msg: impl Into<String>) -> Self {
        Self::InvalidSetting(msg.into())
    }
}
