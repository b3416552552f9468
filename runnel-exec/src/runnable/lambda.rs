use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, Stream, StreamExt};
use runnel_core::{BoxError, ChunkAccumulator, RunError, RunnableConfig, Value};

use crate::runnable::{ChunkStream, RunScope, Runnable};

type SyncFn = dyn Fn(Value) -> Result<Value, BoxError> + Send + Sync;
type AsyncFn = dyn Fn(Value, RunnableConfig) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;
type StreamFn =
    dyn Fn(Value, RunnableConfig) -> BoxStream<'static, Result<Value, BoxError>> + Send + Sync;

#[derive(Clone)]
enum Body {
    Sync(Arc<SyncFn>),
    Blocking(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
    Stream(Arc<StreamFn>),
}

/// Wraps a user function as a runnable.
///
/// Errors returned by the function become [`RunError::Execution`] unless they
/// already are a `RunError` (for example one raised by a nested `invoke`),
/// in which case they propagate unchanged.
#[derive(Clone)]
pub struct Lambda {
    name: String,
    body: Body,
}

impl std::fmt::Debug for Lambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lambda").field("name", &self.name).finish()
    }
}

impl Lambda {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: "Lambda".to_string(),
            body: Body::Sync(Arc::new(func)),
        }
    }

    /// CPU-bound work, run on the blocking thread pool.
    pub fn blocking<F>(func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: "Lambda".to_string(),
            body: Body::Blocking(Arc::new(func)),
        }
    }

    /// The function receives the nested-call config, so it can invoke other
    /// runnables as children of this run.
    pub fn from_async<F, Fut>(func: F) -> Self
    where
        F: Fn(Value, RunnableConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            name: "Lambda".to_string(),
            body: Body::Async(Arc::new(move |input, config| func(input, config).boxed())),
        }
    }

    /// Native streaming: `invoke` returns the merge of everything the stream yields.
    pub fn from_stream<F, S>(func: F) -> Self
    where
        F: Fn(Value, RunnableConfig) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            name: "Lambda".to_string(),
            body: Body::Stream(Arc::new(move |input, config| func(input, config).boxed())),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Runnable for Lambda {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        match &self.body {
            Body::Sync(func) => func(input).map_err(RunError::from_boxed),
            Body::Blocking(func) => {
                let func = func.clone();
                tokio::task::spawn_blocking(move || func(input))
                    .await
                    .map_err(|e| RunError::TaskJoin(e.to_string()))?
                    .map_err(RunError::from_boxed)
            }
            Body::Async(func) => func(input, scope.config().clone())
                .await
                .map_err(RunError::from_boxed),
            Body::Stream(func) => {
                let mut chunks = func(input, scope.config().clone());
                let mut merged = ChunkAccumulator::new();
                while let Some(chunk) = chunks.next().await {
                    merged.push(&chunk.map_err(RunError::from_boxed)?)?;
                }
                Ok(merged.finish())
            }
        }
    }

    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        match &self.body {
            Body::Stream(func) => func(input, scope.config().clone())
                .map(|item| item.map_err(RunError::from_boxed))
                .boxed(),
            _ => Box::pin(stream::once(self.execute(input, scope))),
        }
    }
}
