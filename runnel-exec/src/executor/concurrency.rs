use std::sync::Arc;

use runnel_core::{RunError, RunnableConfig};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Caps how many child invocations of one fan-out are in flight.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyLimit {
    semaphore: Option<Arc<Semaphore>>,
}

impl ConcurrencyLimit {
    /// `None` means unbounded; a limit of zero is treated as one.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    pub fn from_config(config: &RunnableConfig) -> Self {
        Self::new(config.max_concurrency)
    }

    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Waits for a slot, giving up if `token` is cancelled first.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<ConcurrencyPermit, RunError> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(ConcurrencyPermit { _permit: None });
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(RunError::Cancelled),
            permit = semaphore.clone().acquire_owned() => permit
                .map(|p| ConcurrencyPermit { _permit: Some(p) })
                .map_err(|_| RunError::TaskJoin("concurrency semaphore closed".to_string())),
        }
    }
}

pub struct ConcurrencyPermit {
    _permit: Option<OwnedSemaphorePermit>,
}
