use async_trait::async_trait;
use runnel_core::{RunError, Value};
use tracing::{debug, warn};

use crate::retry::config::RetryConfig;
use crate::retry::decision::{decide_retry, RetryDecision};
use crate::runnable::{DynRunnable, RunScope, Runnable};

/// Re-invokes the inner runnable on retryable failures.
///
/// Every attempt is its own child run; attempts after the first are tagged
/// `retry:attempt:<n>`.
#[derive(Clone)]
pub struct Retry {
    inner: DynRunnable,
    config: RetryConfig,
}

impl Retry {
    pub fn new(inner: DynRunnable, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl Runnable for Retry {
    fn name(&self) -> String {
        format!("Retry<{}>", self.inner.name())
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let mut attempt_no = 1usize;
        loop {
            let tag = (attempt_no > 1).then(|| format!("retry:attempt:{attempt_no}"));
            let err = match self.inner.invoke(input.clone(), &scope.child_config(tag)).await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            if !err.is_cancellation() {
                if let Some(hook) = &self.config.on_failed_attempt {
                    hook(&err, attempt_no);
                }
            }

            match decide_retry(&self.config, attempt_no, &err, || fastrand::u64(..)) {
                RetryDecision::Stop { reason } => {
                    debug!(attempt_no, ?reason, error = %err, "not retrying");
                    return Err(err);
                }
                RetryDecision::RetryAfter { delay, .. } => {
                    warn!(
                        attempt_no,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        let token = scope.cancellation();
                        tokio::select! {
                            _ = token.cancelled() => return Err(RunError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    attempt_no += 1;
                }
            }
        }
    }
}
