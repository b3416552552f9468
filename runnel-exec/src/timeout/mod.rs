use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use runnel_core::{RunError, RunnableConfig, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runnable::call::with_deadline;
use crate::runnable::{ChunkStream, DynRunnable, RunScope, Runnable};

/// Bounds the inner runnable's wall-clock time.
///
/// On expiry the inner subtree is cancelled through a child token (the
/// caller's token is left alone), its runs are allowed to close, and the
/// call fails with [`RunError::Timeout`]. A deadline can also be set per call
/// through [`RunnableConfig::timeout`].
#[derive(Clone)]
pub struct Timeout {
    inner: DynRunnable,
    after: Duration,
}

impl Timeout {
    pub fn new(inner: DynRunnable, after: Duration) -> Self {
        Self { inner, after }
    }

    pub fn after(&self) -> Duration {
        self.after
    }

    fn inner_config(&self, scope: &RunScope) -> (RunnableConfig, CancellationToken) {
        let token = scope.cancellation().child_token();
        let config = scope.child_config(None).with_cancellation(token.clone());
        (config, token)
    }
}

enum Step {
    Chunk(Result<Value, RunError>),
    Done,
    Expired,
}

#[async_trait]
impl Runnable for Timeout {
    fn name(&self) -> String {
        format!("Timeout<{}>", self.inner.name())
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let (config, token) = self.inner_config(scope);
        with_deadline(self.inner.invoke(input, &config), self.after, &token).await
    }

    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        Box::pin(async_stream::stream! {
            let (config, token) = self.inner_config(scope);
            let deadline = tokio::time::sleep(self.after);
            tokio::pin!(deadline);
            let mut chunks = self.inner.stream(input, &config);

            loop {
                let step = tokio::select! {
                    next = chunks.next() => next.map_or(Step::Done, Step::Chunk),
                    _ = &mut deadline => Step::Expired,
                };
                match step {
                    Step::Done => return,
                    Step::Chunk(chunk) => {
                        yield chunk;
                    }
                    Step::Expired => {
                        debug!(after_ms = self.after.as_millis() as u64, "deadline reached, cancelling");
                        token.cancel();
                        while chunks.next().await.is_some() {}
                        yield Err(RunError::Timeout { after: self.after });
                        return;
                    }
                }
            }
        })
    }
}
