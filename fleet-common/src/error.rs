use thiserror::Error;

/// Input rejected before any work was done. No partial state is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidArgument {
    #[error("weights must not be empty")]
    EmptyWeights,
    #[error("weight at index {index} is not a non-negative finite number: {value}")]
    InvalidWeight { index: usize, value: f64 },
    #[error("weights must have a positive sum")]
    ZeroWeightSum,
    #[error("ratio must be a finite number in [0, 1], got {0}")]
    InvalidRatio(f64),
    #[error("host {0} appears in both the transfer and retain groups")]
    OverlappingPlan(String),
    #[error("host {0} is not covered by the migration plan")]
    UncoveredHost(String),
    #[error("a reason is required to lock hosts")]
    MissingReason,
}
