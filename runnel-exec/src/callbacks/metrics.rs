use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use runnel_core::{CallbackHandler, Run, RunError, RunStatus, Value};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub runs_started: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub runs_cancelled: usize,
    pub chunks: usize,
    pub root_runs: usize,
    pub total_duration: Duration,
}

impl RunMetrics {
    pub fn record_start(&mut self, run: &Run) {
        self.runs_started += 1;
        if run.is_root() {
            self.root_runs += 1;
        }
    }

    pub fn record_finish(&mut self, run: &Run) {
        match run.status {
            RunStatus::Succeeded => self.runs_succeeded += 1,
            RunStatus::Failed => self.runs_failed += 1,
            RunStatus::Cancelled => self.runs_cancelled += 1,
            RunStatus::Pending | RunStatus::Running => return,
        }
        if let Some(elapsed) = run.duration().and_then(|d| d.to_std().ok()) {
            self.total_duration += elapsed;
        }
    }

    pub fn record_chunk(&mut self) {
        self.chunks += 1;
    }

    pub fn runs_finished(&self) -> usize {
        self.runs_succeeded + self.runs_failed + self.runs_cancelled
    }

    /// Runs started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.runs_started.saturating_sub(self.runs_finished())
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "runs": {
                "started": self.runs_started,
                "roots": self.root_runs,
                "succeeded": self.runs_succeeded,
                "failed": self.runs_failed,
                "cancelled": self.runs_cancelled,
            },
            "chunks": self.chunks,
            "duration_ms": self.total_duration.as_millis() as u64,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<RunMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_metrics(&self) -> RunMetrics {
        self.metrics.lock().await.clone()
    }
}

/// Counts runs and chunks into a shared [`MetricsCollector`].
pub struct MetricsHandler {
    collector: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl CallbackHandler for MetricsHandler {
    async fn on_run_start(&self, run: &Run) {
        self.collector.metrics.lock().await.record_start(run);
    }

    async fn on_run_end(&self, run: &Run) {
        self.collector.metrics.lock().await.record_finish(run);
    }

    async fn on_run_error(&self, run: &Run, _error: &RunError) {
        self.collector.metrics.lock().await.record_finish(run);
    }

    async fn on_chunk(&self, _run: &Run, _chunk: &Value) {
        self.collector.metrics.lock().await.record_chunk();
    }
}
