use std::path::Path;
use std::sync::Arc;

use envconfig::Envconfig;
use eyre::{Result, WrapErr};
use fleet_common::types::{HostId, HostSet, MigrationSummary};
use fleet_migrator::config::{Config, Mode};
use fleet_migrator::fleet::{LegacyFleet, TargetFleet};
use fleet_migrator::orchestrator::Orchestrator;
use fleet_migrator::plan::{FairPartitionPlanner, PlanSource, StaticPlan};
use fleet_migrator::rollback::Rollback;
use fleet_migrator::tools::{AtestClient, SkylabClient};
use serde::Serialize;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::init_from_env().wrap_err("failed to load configuration from env")?;
    let mode = config.mode()?;

    let hosts = read_hostnames(Path::new(&config.hostnames_file)).await?;
    info!(hosts = hosts.len(), ?mode, "starting fleet migrator");

    let legacy: Arc<dyn LegacyFleet> = Arc::new(AtestClient::new(&config.legacy_tool_path));
    let target: Arc<dyn TargetFleet> = Arc::new(SkylabClient::new(&config.target_tool_path));

    match mode {
        Mode::Migrate => {
            let planner: Arc<dyn PlanSource> = match (&config.plan_file, config.plan_seed) {
                (Some(path), _) => Arc::new(StaticPlan::from_file(Path::new(path)).await?),
                (None, Some(seed)) => Arc::new(FairPartitionPlanner::seeded(seed)),
                (None, None) => Arc::new(FairPartitionPlanner::new()),
            };
            let previous = match &config.previous_summary_file {
                Some(path) => Some(read_summary(Path::new(path)).await?),
                None => None,
            };

            let orchestrator =
                Orchestrator::new(legacy, target, planner, config.migration_settings()?);
            let summary = orchestrator.run(&hosts, previous.as_ref()).await?;
            emit(&summary, config.summary_file.as_deref()).await
        }
        Mode::Rollback => {
            let bug = config.rollback_bug.as_ref().map(|b| b.as_str().to_owned());
            let report = Rollback::new(legacy, target, bug)
                .run(&hosts, config.dry_run)
                .await?;
            emit(&report, config.summary_file.as_deref()).await
        }
    }
}

async fn read_hostnames(path: &Path) -> Result<HostSet> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("failed to read hostnames from {}", path.display()))?;
    Ok(parse_hostnames(&contents))
}

fn parse_hostnames(contents: &str) -> HostSet {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(HostId::new)
        .collect()
}

async fn read_summary(path: &Path) -> Result<MigrationSummary> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("failed to read previous summary {}", path.display()))?;
    serde_json::from_str(&contents)
        .wrap_err_with(|| format!("failed to parse previous summary {}", path.display()))
}

/// Print `value` as JSON to stdout, and to `path` when one is configured.
async fn emit<T: Serialize>(value: &T, path: Option<&str>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");

    if let Some(path) = path {
        tokio::fs::write(path, format!("{json}\n"))
            .await
            .wrap_err_with(|| format!("failed to write summary to {path}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::types::host_set;

    #[test]
    fn test_parse_hostnames() {
        let hosts = parse_hostnames("# lab 3\nhost-b\n\n  host-a  \nhost-b\n");
        assert_eq!(hosts, host_set(["host-a", "host-b"]));
    }
}
