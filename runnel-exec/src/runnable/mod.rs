use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use runnel_core::{RunError, RunnableConfig, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{self, EventFilter, EventStream};
use crate::executor::batch::{self, BatchOptions};
use crate::executor::{Each, Parallel, Sequence};
use crate::fallback::Fallback;
use crate::retry::{Retry, RetryConfig};
use crate::timeout::Timeout;

pub mod bound;
pub mod call;
pub mod lambda;
pub mod passthrough;

pub use bound::{Bound, RunListeners, WithListeners};
pub use lambda::Lambda;
pub use passthrough::{Assign, Passthrough, Pick};

pub type ChunkStream<'a> = BoxStream<'a, Result<Value, RunError>>;
pub type DynRunnable = Arc<dyn Runnable>;

/// What a runnable sees while its own run is open.
///
/// `config` is already derived for nested calls: callbacks are parented under
/// this run and one level of recursion budget is spent.
#[derive(Debug, Clone)]
pub struct RunScope {
    run_id: Uuid,
    config: RunnableConfig,
}

impl RunScope {
    pub fn new(run_id: Uuid, config: RunnableConfig) -> Self {
        Self { run_id, config }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &RunnableConfig {
        &self.config
    }

    /// Config for one nested call, optionally tagged with its position.
    pub fn child_config(&self, tag: Option<String>) -> RunnableConfig {
        match tag {
            Some(tag) => self.config.clone().with_tag(tag),
            None => self.config.clone(),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.config.cancellation_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.config.is_cancelled()
    }
}

/// A unit of work from a JSON value to a JSON value.
///
/// Implementors provide [`Runnable::execute`] (and optionally
/// [`Runnable::execute_stream`]); the provided `invoke`, `stream` and batch
/// methods wrap those bodies in a run: callbacks, recursion budget and
/// cancellation are handled there.
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> String;

    /// Whether an in-flight execution may be dropped as soon as cancellation
    /// fires. Composites return `false`: they let their children observe the
    /// token so every run in the subtree closes before they do.
    fn preemptible(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError>;

    /// Streaming body. Merging the chunks must give what `execute` returns.
    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        Box::pin(stream::once(self.execute(input, scope)))
    }

    async fn invoke(&self, input: Value, config: &RunnableConfig) -> Result<Value, RunError> {
        call::invoke_with_run(self, input, config).await
    }

    fn stream<'a>(&'a self, input: Value, config: &RunnableConfig) -> ChunkStream<'a> {
        call::stream_with_run(self, input, config.clone())
    }

    /// Invokes every input; the first failure cancels the rest and is
    /// returned once the in-flight items have settled.
    async fn batch(
        &self,
        inputs: Vec<Value>,
        config: &RunnableConfig,
    ) -> Result<Vec<Value>, RunError> {
        self.batch_with_options(inputs, config, BatchOptions::default())
            .await?
            .into_iter()
            .collect()
    }

    async fn batch_with_options(
        &self,
        inputs: Vec<Value>,
        config: &RunnableConfig,
        options: BatchOptions,
    ) -> Result<Vec<Result<Value, RunError>>, RunError> {
        let configs = vec![config.clone(); inputs.len()];
        batch::batch_with_configs(self, inputs, configs, options).await
    }

    async fn batch_with_configs(
        &self,
        inputs: Vec<Value>,
        configs: Vec<RunnableConfig>,
        options: BatchOptions,
    ) -> Result<Vec<Result<Value, RunError>>, RunError> {
        batch::batch_with_configs(self, inputs, configs, options).await
    }

    /// Yields `(index, result)` pairs as items finish.
    fn batch_as_completed<'a>(
        &'a self,
        inputs: Vec<Value>,
        config: &RunnableConfig,
    ) -> BoxStream<'a, (usize, Result<Value, RunError>)> {
        batch::batch_as_completed(self, inputs, config.clone())
    }

    /// Streams the lifecycle and chunk events of the whole run tree.
    fn stream_events<'a>(
        &'a self,
        input: Value,
        config: &RunnableConfig,
        filter: EventFilter,
    ) -> EventStream<'a> {
        events::stream_events(self, input, config.clone(), filter)
    }
}

#[async_trait]
impl<R: Runnable + ?Sized> Runnable for Arc<R> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn preemptible(&self) -> bool {
        (**self).preemptible()
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        (**self).execute(input, scope).await
    }

    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        (**self).execute_stream(input, scope)
    }

    async fn invoke(&self, input: Value, config: &RunnableConfig) -> Result<Value, RunError> {
        (**self).invoke(input, config).await
    }

    fn stream<'a>(&'a self, input: Value, config: &RunnableConfig) -> ChunkStream<'a> {
        (**self).stream(input, config)
    }

    async fn batch_with_configs(
        &self,
        inputs: Vec<Value>,
        configs: Vec<RunnableConfig>,
        options: BatchOptions,
    ) -> Result<Vec<Result<Value, RunError>>, RunError> {
        (**self).batch_with_configs(inputs, configs, options).await
    }
}

/// Composition operators. Each returns a new runnable and leaves `self` as it was.
pub trait RunnableExt: Runnable + Sized + 'static {
    fn boxed(self) -> DynRunnable {
        Arc::new(self)
    }

    fn pipe<R: Runnable + 'static>(self, next: R) -> Sequence {
        Sequence::from_steps(vec![self.boxed(), next.boxed()])
    }

    fn with_config(self, config: RunnableConfig) -> Bound {
        Bound::new(self.boxed(), config)
    }

    fn with_name(self, name: impl Into<String>) -> Bound {
        Bound::new(self.boxed(), RunnableConfig::new().with_run_name(name))
    }

    fn with_retry(self, config: RetryConfig) -> Retry {
        Retry::new(self.boxed(), config)
    }

    fn with_fallbacks(self, fallbacks: Vec<DynRunnable>) -> Fallback {
        Fallback::new(self.boxed(), fallbacks)
    }

    fn with_timeout(self, after: Duration) -> Timeout {
        Timeout::new(self.boxed(), after)
    }

    fn with_listeners(self, listeners: RunListeners) -> WithListeners {
        WithListeners::new(self.boxed(), listeners)
    }

    fn map_each(self) -> Each {
        Each::new(self.boxed())
    }

    /// Pipes the output into a [`Pick`] of `keys`; a single key yields its
    /// value rather than an object.
    fn pick<I, S>(self, keys: I) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipe(Pick::keys(keys))
    }

    /// Pipes the output into an [`Assign`] that adds `mapper`'s keys to it.
    fn assign(self, mapper: Parallel) -> Sequence {
        self.pipe(Assign::new(mapper))
    }
}

impl<R: Runnable + 'static> RunnableExt for R {}
