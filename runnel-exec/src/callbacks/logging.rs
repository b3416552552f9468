use async_trait::async_trait;
use runnel_core::{CallbackHandler, Run, RunError, Value};
use tracing::{debug, info, trace, warn};

/// Logs run lifecycles through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler {
    chunks: bool,
}

impl LoggingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also trace every streamed chunk.
    pub fn with_chunks(mut self) -> Self {
        self.chunks = true;
        self
    }
}

#[async_trait]
impl CallbackHandler for LoggingHandler {
    async fn on_run_start(&self, run: &Run) {
        debug!(
            run_id = %run.id,
            parent_run_id = ?run.parent_run_id,
            name = %run.name,
            tags = ?run.tags,
            "run start"
        );
    }

    async fn on_run_end(&self, run: &Run) {
        let duration_ms = run.duration().map(|d| d.num_milliseconds());
        if run.is_root() {
            info!(run_id = %run.id, name = %run.name, duration_ms, "run end");
        } else {
            debug!(run_id = %run.id, name = %run.name, duration_ms, "run end");
        }
    }

    async fn on_run_error(&self, run: &Run, error: &RunError) {
        warn!(
            run_id = %run.id,
            name = %run.name,
            status = run.status.as_str(),
            kind = error.kind(),
            error = %error,
            "run error"
        );
    }

    async fn on_chunk(&self, run: &Run, chunk: &Value) {
        if self.chunks {
            trace!(run_id = %run.id, name = %run.name, %chunk, "run chunk");
        }
    }
}
