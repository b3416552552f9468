use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::RunError;
use crate::run::Run;

/// Observer of run lifecycles. Every hook is optional.
///
/// Hooks for one run are delivered in order: start, then chunks, then exactly
/// one of end or error.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn on_run_start(&self, _run: &Run) {}

    async fn on_run_end(&self, _run: &Run) {}

    async fn on_run_error(&self, _run: &Run, _error: &RunError) {}

    async fn on_chunk(&self, _run: &Run, _chunk: &Value) {}
}

/// Fans run lifecycle notifications out to a set of handlers.
///
/// Clones are independent: adding a handler to one copy never affects another.
#[derive(Clone, Default)]
pub struct CallbackManager {
    handlers: Vec<Arc<dyn CallbackHandler>>,
    parent_run_id: Option<Uuid>,
}

impl fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackManager")
            .field("handlers", &self.handlers.len())
            .field("parent_run_id", &self.parent_run_id)
            .finish()
    }
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn CallbackHandler>) -> Self {
        self.add_handler(handler);
        self
    }

    pub fn add_handler(&mut self, handler: Arc<dyn CallbackHandler>) {
        if !self.contains(&handler) {
            self.handlers.push(handler);
        }
    }

    pub fn handlers(&self) -> &[Arc<dyn CallbackHandler>] {
        &self.handlers
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn parent_run_id(&self) -> Option<Uuid> {
        self.parent_run_id
    }

    /// Union of both handler sets; `other`'s parent wins when it has one.
    pub fn merge(&self, other: &CallbackManager) -> CallbackManager {
        let mut merged = self.clone();
        for handler in &other.handlers {
            merged.add_handler(handler.clone());
        }
        merged.parent_run_id = other.parent_run_id.or(self.parent_run_id);
        merged
    }

    /// Same handlers, with every run they see parented under `parent_run_id`.
    pub fn for_child(&self, parent_run_id: Uuid) -> CallbackManager {
        CallbackManager {
            handlers: self.handlers.clone(),
            parent_run_id: Some(parent_run_id),
        }
    }

    /// Moves `run` to `Running` under this manager's parent and notifies every handler.
    pub async fn start_run(&self, run: Run) -> RunManager {
        let mut run = run.with_parent(self.parent_run_id);
        run.start();
        debug!(
            run_id = %run.id,
            parent_run_id = ?run.parent_run_id,
            name = %run.name,
            "run started"
        );
        for handler in &self.handlers {
            handler.on_run_start(&run).await;
        }
        RunManager {
            run,
            handlers: self.handlers.clone(),
            closed: false,
        }
    }

    fn contains(&self, handler: &Arc<dyn CallbackHandler>) -> bool {
        let target = Arc::as_ptr(handler) as *const ();
        self.handlers
            .iter()
            .any(|h| Arc::as_ptr(h) as *const () == target)
    }
}

/// Handle to one open run. Consuming it with [`RunManager::end`] or
/// [`RunManager::error`] closes the run.
///
/// Dropping an open handle (an abandoned stream, a future dropped on
/// cancellation) closes the run as cancelled on the current runtime.
pub struct RunManager {
    run: Run,
    handlers: Vec<Arc<dyn CallbackHandler>>,
    closed: bool,
}

impl fmt::Debug for RunManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunManager")
            .field("run", &self.run)
            .field("handlers", &self.handlers.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl RunManager {
    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn child_callbacks(&self) -> CallbackManager {
        CallbackManager {
            handlers: self.handlers.clone(),
            parent_run_id: Some(self.run.id),
        }
    }

    pub async fn on_chunk(&self, chunk: &Value) {
        trace!(run_id = %self.run.id, "chunk");
        for handler in &self.handlers {
            handler.on_chunk(&self.run, chunk).await;
        }
    }

    pub async fn end(mut self, outputs: Value) {
        self.closed = true;
        self.run.succeed(outputs);
        debug!(run_id = %self.run.id, name = %self.run.name, "run succeeded");
        for handler in &self.handlers {
            handler.on_run_end(&self.run).await;
        }
    }

    pub async fn error(mut self, error: &RunError) {
        self.closed = true;
        self.run.fail(error);
        debug!(
            run_id = %self.run.id,
            name = %self.run.name,
            status = self.run.status.as_str(),
            error = %error,
            "run failed"
        );
        for handler in &self.handlers {
            handler.on_run_error(&self.run, error).await;
        }
    }
}

impl Drop for RunManager {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.run.fail(&RunError::Cancelled);
        if self.handlers.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(run_id = %self.run.id, "run abandoned outside a runtime");
            return;
        };
        debug!(run_id = %self.run.id, name = %self.run.name, "run abandoned");
        let run = self.run.clone();
        let handlers = std::mem::take(&mut self.handlers);
        runtime.spawn(async move {
            let error = RunError::Cancelled;
            for handler in &handlers {
                handler.on_run_error(&run, &error).await;
            }
        });
    }
}
