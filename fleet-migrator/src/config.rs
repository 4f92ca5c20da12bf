use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use fleet_common::retry::RetryPolicy;

use crate::error::MigrationError;
use crate::orchestrator::MigrationSettings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "LEGACY_TOOL_PATH", default = "atest")]
    pub legacy_tool_path: String,

    #[envconfig(from = "TARGET_TOOL_PATH", default = "skylab")]
    pub target_tool_path: String,

    // One hostname per line, blank lines and lines starting with '#' are ignored.
    pub hostnames_file: String,

    pub plan_file: Option<String>,

    pub previous_summary_file: Option<String>,

    pub summary_file: Option<String>,

    #[envconfig(default = "migrate")]
    pub mode: String,

    #[envconfig(default = "1.0")]
    pub migration_ratio: f64,

    // Required when migrating, unused by a rollback.
    pub migration_reason: Option<NonEmptyString>,

    #[envconfig(default = "false")]
    pub migrate_immediately: bool,

    #[envconfig(default = "3600000")]
    pub max_duration: EnvMsDuration,

    #[envconfig(default = "30000")]
    pub poll_interval: EnvMsDuration,

    #[envconfig(default = "10")]
    pub min_ready_intervals: u32,

    pub plan_seed: Option<u64>,

    pub rollback_bug: Option<NonEmptyString>,

    #[envconfig(default = "false")]
    pub dry_run: bool,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,
}

impl Config {
    pub fn mode(&self) -> Result<Mode, MigrationError> {
        Mode::from_str(&self.mode)
    }

    pub fn migration_settings(&self) -> Result<MigrationSettings, MigrationError> {
        let reason = self.migration_reason.as_ref().ok_or_else(|| {
            MigrationError::invalid_setting("MIGRATION_REASON is required to migrate")
        })?;
        let retry = self.retry_policy.retry_policy();

        Ok(MigrationSettings {
            reason: reason.as_str().to_owned(),
            ratio: self.migration_ratio,
            migrate_immediately: self.migrate_immediately,
            max_duration: self.max_duration.0,
            poll_interval: self.poll_interval.0,
            min_ready_intervals: self.min_ready_intervals,
            lock_retry: retry.clone(),
            assign_retry: retry.clone(),
            rename_retry: retry,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Migrate,
    Rollback,
}

impl FromStr for Mode {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, MigrationError> {
        match s {
            "migrate" => Ok(Mode::Migrate),
            "rollback" => Ok(Mode::Rollback),
            _ => Err(MigrationError::invalid_setting(format!(
                "unknown mode {s:?}, expected migrate or rollback"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Envconfig, Clone)]
pub struct RetryPolicyConfig {
    #[envconfig(from = "RETRY_MAX_ATTEMPTS", default = "3")]
    pub max_attempts: u32,

    #[envconfig(from = "RETRY_BACKOFF_COEFFICIENT", default = "2")]
    pub backoff_coefficient: u32,

    #[envconfig(from = "RETRY_INITIAL_INTERVAL", default = "1000")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(from = "RETRY_MAXIMUM_INTERVAL", default = "30000")]
    pub maximum_interval: EnvMsDuration,
}

impl RetryPolicyConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::build(self.max_attempts, self.initial_interval.0)
            .backoff_coefficient(self.backoff_coefficient)
            .maximum_interval(self.maximum_interval.0)
            .provide()
    }
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
