//! Where migration plans come from.
//!
//! A plan can be computed locally with the fair partitioner, or handed in from somewhere
//! else (for example a plan file produced by a separate planning run). Both satisfy the same
//! contract, so the orchestrator does not care which one it is given.
use std::path::Path;

use async_trait::async_trait;
use fleet_common::partition::partition;
use fleet_common::types::{HostId, HostSet, MigrationPlan};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::error::MigrationError;

#[async_trait]
pub trait PlanSource: Send + Sync {
    /// Produce a plan whose transfer and retain groups are disjoint and together are exactly
    /// `hosts`.
    async fn plan(&self, hosts: &HostSet, ratio: f64) -> Result<MigrationPlan, MigrationError>;
}

/// Moves `ratio` of the hosts, chosen uniformly at random.
#[derive(Debug, Clone, Default)]
pub struct FairPartitionPlanner {
    seed: Option<u64>,
}

impl FairPartitionPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A planner that picks the same hosts for the same input every time.
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[async_trait]
impl PlanSource for FairPartitionPlanner {
    async fn plan(&self, hosts: &HostSet, ratio: f64) -> Result<MigrationPlan, MigrationError> {
        let items: Vec<HostId> = hosts.iter().cloned().collect();
        let split = partition(&items, ratio, &mut self.rng())?;

        debug!(
            transfer = split.transfer.len(),
            retain = split.retain.len(),
            ratio,
            "partitioned hosts"
        );

        Ok(MigrationPlan::new(
            split.transfer.into_iter().collect(),
            split.retain.into_iter().collect(),
        )?)
    }
}

/// A plan decided ahead of time. The ratio is ignored.
#[derive(Debug, Clone)]
pub struct StaticPlan {
    plan: MigrationPlan,
}

impl StaticPlan {
    pub fn new(plan: MigrationPlan) -> Self {
        Self { plan }
    }

    /// Every host goes into the transfer group.
    pub fn transfer_all(hosts: HostSet) -> Self {
        Self::new(MigrationPlan {
            transfer: hosts,
            retain: HostSet::new(),
        })
    }

    /// Load a plan from a JSON file shaped like `{"transfer": [...], "retain": [...]}`.
    pub async fn from_file(path: &Path) -> Result<Self, MigrationError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| MigrationError::PlanFile {
                path: path.to_owned(),
                source,
            })?;
        let plan: MigrationPlan =
            serde_json::from_str(&contents).map_err(|source| MigrationError::PlanFormat {
                path: path.to_owned(),
                source,
            })?;

        Ok(Self::new(MigrationPlan::new(plan.transfer, plan.retain)?))
    }
}

#[async_trait]
impl PlanSource for StaticPlan {
    async fn plan(&self, hosts: &HostSet, _ratio: f64) -> Result<MigrationPlan, MigrationError> {
        Ok(self.plan.restricted_to(hosts)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use fleet_common::error::InvalidArgument;
    use fleet_common::types::host_set;
    use tempfile::NamedTempFile;

    use super::*;

    fn plan_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn hosts(n: usize) -> HostSet {
        (0..n).map(|i| HostId::new(format!("host-{i}"))).collect()
    }

    #[tokio::test]
    async fn test_fair_partition_plan_covers_hosts() {
        let all = hosts(10);
        let plan = FairPartitionPlanner::new().plan(&all, 0.3).await.unwrap();

        assert_eq!(plan.transfer.len(), 3);
        assert_eq!(plan.retain.len(), 7);
        assert!(plan.transfer.is_disjoint(&plan.retain));
        let union: HostSet = plan.transfer.union(&plan.retain).cloned().collect();
        assert_eq!(union, all);
    }

    #[tokio::test]
    async fn test_seeded_planner_is_reproducible() {
        let all = hosts(50);
        let planner = FairPartitionPlanner::seeded(42);
        let first = planner.plan(&all, 0.5).await.unwrap();
        let second = planner.plan(&all, 0.5).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fair_partition_rejects_bad_ratio() {
        let result = FairPartitionPlanner::new().plan(&hosts(3), 2.0).await;

        assert!(matches!(
            result,
            Err(MigrationError::InvalidArgument(InvalidArgument::InvalidRatio(_)))
        ));
    }

    #[tokio::test]
    async fn test_static_plan_is_restricted_to_candidates() {
        let source = StaticPlan::new(
            MigrationPlan::new(host_set(["a", "b"]), host_set(["c"])).unwrap(),
        );
        let plan = source.plan(&host_set(["b", "c"]), 0.0).await.unwrap();

        assert_eq!(plan.transfer, host_set(["b"]));
        assert_eq!(plan.retain, host_set(["c"]));
    }

    #[tokio::test]
    async fn test_static_plan_must_cover_candidates() {
        let source = StaticPlan::transfer_all(host_set(["a"]));
        let result = source.plan(&host_set(["a", "z"]), 1.0).await;

        assert!(matches!(
            result,
            Err(MigrationError::InvalidArgument(InvalidArgument::UncoveredHost(_)))
        ));
    }

    #[tokio::test]
    async fn test_plan_file() {
        let file = plan_file(r#"{"transfer": ["b", "a"], "retain": ["c"]}"#);

        let source = StaticPlan::from_file(file.path()).await.unwrap();

        let plan = source.plan(&host_set(["a", "b", "c"]), 0.5).await.unwrap();
        assert_eq!(plan.transfer, host_set(["a", "b"]));
        assert_eq!(plan.retain, host_set(["c"]));
    }

    #[tokio::test]
    async fn test_plan_file_overlap_is_rejected() {
        let file = plan_file(r#"{"transfer": ["a"], "retain": ["a"]}"#);

        let result = StaticPlan::from_file(file.path()).await;

        assert!(matches!(
            result,
            Err(MigrationError::InvalidArgument(InvalidArgument::OverlappingPlan(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_plan_file() {
        let result = StaticPlan::from_file(Path::new("/nonexistent/plan.json")).await;
        assert!(matches!(result, Err(MigrationError::PlanFile { .. })));
    }
}
