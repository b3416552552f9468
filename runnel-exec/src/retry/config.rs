use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use runnel_core::RunError;

pub type RetryPredicate = Arc<dyn Fn(&RunError) -> bool + Send + Sync>;
/// Called with the failed attempt's error and its 1-based attempt number.
pub type FailedAttemptHook = Arc<dyn Fn(&RunError, usize) + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// Full jitter: each delay is drawn uniformly from `[0, backoff]`.
    pub jitter: bool,
    pub retry_if: Option<RetryPredicate>,
    pub on_failed_attempt: Option<FailedAttemptHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
            retry_if: None,
            on_failed_attempt: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("factor", &self.factor)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("retry_if", &self.retry_if.is_some())
            .field("on_failed_attempt", &self.on_failed_attempt.is_some())
            .finish()
    }
}

impl RetryConfig {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.factor = factor;
        self.max_delay = max_delay;
        self
    }

    /// Retries back to back, without waiting.
    pub fn without_delay(mut self) -> Self {
        self.base_delay = Duration::ZERO;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn retry_if(mut self, predicate: impl Fn(&RunError) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn on_failed_attempt(mut self, hook: impl Fn(&RunError, usize) + Send + Sync + 'static) -> Self {
        self.on_failed_attempt = Some(Arc::new(hook));
        self
    }

    /// Execution failures are retryable unless a predicate says otherwise.
    /// Cancellation never is.
    pub fn is_retryable(&self, error: &RunError) -> bool {
        if error.is_cancellation() {
            return false;
        }
        match &self.retry_if {
            Some(predicate) => predicate(error),
            None => matches!(error, RunError::Execution(_) | RunError::Aggregate(_)),
        }
    }
}
