mod config;
mod decision;
mod runnable;

pub use config::{FailedAttemptHook, RetryConfig, RetryPredicate};
pub use decision::{decide_retry, RetryDecision, RetryReason};
pub use runnable::Retry;
