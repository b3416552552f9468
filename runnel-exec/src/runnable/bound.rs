use std::sync::Arc;

use async_trait::async_trait;
use runnel_core::{CallbackHandler, Run, RunError, RunnableConfig, Value};
use uuid::Uuid;

use crate::runnable::{ChunkStream, DynRunnable, RunScope, Runnable};

/// A runnable with configuration layered under every call.
///
/// Binding does not add a run of its own: the bound config is merged into the
/// caller's (bound values win, cancellation stays the caller's) and the inner
/// runnable runs as usual.
#[derive(Clone)]
pub struct Bound {
    inner: DynRunnable,
    config: RunnableConfig,
}

impl Bound {
    pub fn new(inner: DynRunnable, config: RunnableConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RunnableConfig {
        &self.config
    }

    fn layered(&self, config: &RunnableConfig) -> RunnableConfig {
        config.merge(&self.config)
    }
}

#[async_trait]
impl Runnable for Bound {
    fn name(&self) -> String {
        self.config
            .run_name
            .clone()
            .unwrap_or_else(|| self.inner.name())
    }

    fn preemptible(&self) -> bool {
        self.inner.preemptible()
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        self.inner.execute(input, scope).await
    }

    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        self.inner.execute_stream(input, scope)
    }

    async fn invoke(&self, input: Value, config: &RunnableConfig) -> Result<Value, RunError> {
        self.inner.invoke(input, &self.layered(config)).await
    }

    fn stream<'a>(&'a self, input: Value, config: &RunnableConfig) -> ChunkStream<'a> {
        self.inner.stream(input, &self.layered(config))
    }
}

pub type RunListener = Arc<dyn Fn(&Run) + Send + Sync>;

/// Hooks fired for the wrapped runnable's own run, never for its children.
#[derive(Clone, Default)]
pub struct RunListeners {
    on_start: Option<RunListener>,
    on_end: Option<RunListener>,
    on_error: Option<RunListener>,
}

impl RunListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, listener: impl Fn(&Run) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(listener));
        self
    }

    pub fn on_end(mut self, listener: impl Fn(&Run) + Send + Sync + 'static) -> Self {
        self.on_end = Some(Arc::new(listener));
        self
    }

    pub fn on_error(mut self, listener: impl Fn(&Run) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(listener));
        self
    }
}

/// Attaches [`RunListeners`] to every call of the inner runnable.
#[derive(Clone)]
pub struct WithListeners {
    inner: DynRunnable,
    listeners: RunListeners,
}

impl WithListeners {
    pub fn new(inner: DynRunnable, listeners: RunListeners) -> Self {
        Self { inner, listeners }
    }

    fn with_handler(&self, config: &RunnableConfig) -> RunnableConfig {
        let handler = ListenerHandler {
            parent_run_id: config.callbacks.parent_run_id(),
            listeners: self.listeners.clone(),
        };
        config.clone().with_handler(Arc::new(handler))
    }
}

#[async_trait]
impl Runnable for WithListeners {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn preemptible(&self) -> bool {
        self.inner.preemptible()
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        self.inner.execute(input, scope).await
    }

    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        self.inner.execute_stream(input, scope)
    }

    async fn invoke(&self, input: Value, config: &RunnableConfig) -> Result<Value, RunError> {
        self.inner.invoke(input, &self.with_handler(config)).await
    }

    fn stream<'a>(&'a self, input: Value, config: &RunnableConfig) -> ChunkStream<'a> {
        self.inner.stream(input, &self.with_handler(config))
    }
}

/// Created per call; only the run whose parent matches the caller's is the
/// wrapped runnable's own run.
struct ListenerHandler {
    parent_run_id: Option<Uuid>,
    listeners: RunListeners,
}

impl ListenerHandler {
    fn fire(&self, listener: &Option<RunListener>, run: &Run) {
        if run.parent_run_id != self.parent_run_id {
            return;
        }
        if let Some(listener) = listener {
            listener(run);
        }
    }
}

#[async_trait]
impl CallbackHandler for ListenerHandler {
    async fn on_run_start(&self, run: &Run) {
        self.fire(&self.listeners.on_start, run);
    }

    async fn on_run_end(&self, run: &Run) {
        self.fire(&self.listeners.on_end, run);
    }

    async fn on_run_error(&self, run: &Run, _error: &RunError) {
        self.fire(&self.listeners.on_error, run);
    }
}
