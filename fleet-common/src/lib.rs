pub mod apportion;
pub mod error;
pub mod partition;
pub mod retry;
pub mod types;
