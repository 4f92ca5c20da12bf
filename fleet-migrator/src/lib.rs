pub mod config;
pub mod drivers;
pub mod error;
pub mod fleet;
pub mod metrics_consts;
pub mod mock;
pub mod orchestrator;
pub mod plan;
pub mod readiness;
pub mod rollback;
pub mod tools;
