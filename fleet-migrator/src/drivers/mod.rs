//! Stage drivers. Each one runs a single migration stage against a set of hosts and
//! reports which of them made it through.
use fleet_common::retry::RetryPolicy;

pub mod lock;
pub mod relocate;
pub mod rename;

pub use lock::LockDriver;
pub use relocate::{RelocateDriver, RelocateResult};
pub use rename::RenameDriver;

/// Wait before the attempt following `attempt`.
async fn backoff(retry_policy: &RetryPolicy, attempt: u32) {
    let interval = retry_policy.retry_interval(attempt);
    if !interval.is_zero() {
        tokio::time::sleep(interval).await;
    }
}
