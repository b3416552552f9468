use std::time::Duration;

use runnel_core::RunError;

use crate::retry::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter { delay: Duration, reason: RetryReason },
    Stop { reason: RetryReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Cancelled,
    NotRetryable,
    AttemptsExhausted,
    Backoff,
}

/// Decide if we should retry and how long to wait.
///
/// - `attempt_no`: 1-based number of the attempt that just failed.
/// - `error`: what that attempt failed with.
/// - `rand_u64`: RNG for full jitter.
pub fn decide_retry(
    cfg: &RetryConfig,
    attempt_no: usize,
    error: &RunError,
    rand_u64: impl Fn() -> u64,
) -> RetryDecision {
    if error.is_cancellation() {
        return RetryDecision::Stop {
            reason: RetryReason::Cancelled,
        };
    }
    if !cfg.is_retryable(error) {
        return RetryDecision::Stop {
            reason: RetryReason::NotRetryable,
        };
    }
    if attempt_no >= cfg.max_attempts.max(1) {
        return RetryDecision::Stop {
            reason: RetryReason::AttemptsExhausted,
        };
    }

    // Exponential backoff: base * factor^(attempt_no-1), capped at max_delay.
    let exp = (attempt_no.saturating_sub(1)) as i32;
    let raw = (cfg.base_delay.as_millis() as f64) * cfg.factor.powi(exp);
    let raw_ms = raw.min(cfg.max_delay.as_millis() as f64).max(0.0) as u64;

    let delay_ms = if raw_ms == 0 || !cfg.jitter {
        raw_ms
    } else {
        rand_u64() % raw_ms.saturating_add(1)
    };
    RetryDecision::RetryAfter {
        delay: Duration::from_millis(delay_ms),
        reason: RetryReason::Backoff,
    }
}
