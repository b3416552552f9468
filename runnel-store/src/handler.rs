use std::sync::Arc;

use async_trait::async_trait;
use runnel_core::{CallbackHandler, Run, RunError, Value};
use serde_json::json;
use tracing::warn;

use crate::store::{NewEvent, RunStore};

/// Records run transitions and chunks into a [`RunStore`].
///
/// Callbacks cannot fail the run they observe, so store errors are logged
/// and dropped.
pub struct StoreHandler {
    store: Arc<dyn RunStore>,
}

impl StoreHandler {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    async fn record(&self, run: &Run, event_type: &str, payload: Value) {
        if let Err(err) = self.store.upsert_run(run).await {
            warn!(run_id = %run.id, event_type, error = %err, "failed to store run");
            return;
        }
        self.append(run, event_type, payload).await;
    }

    async fn append(&self, run: &Run, event_type: &str, payload: Value) {
        let event = NewEvent::new(run.id, event_type, payload);
        if let Err(err) = self.store.append_event(event).await {
            warn!(run_id = %run.id, event_type, error = %err, "failed to store run event");
        }
    }
}

#[async_trait]
impl CallbackHandler for StoreHandler {
    async fn on_run_start(&self, run: &Run) {
        let payload = json!({
            "name": run.name,
            "parent_run_id": run.parent_run_id,
            "tags": run.tags,
        });
        self.record(run, "run.started", payload).await;
    }

    async fn on_chunk(&self, run: &Run, chunk: &Value) {
        self.append(run, "run.chunk", json!({ "chunk": chunk })).await;
    }

    async fn on_run_end(&self, run: &Run) {
        let payload = json!({ "status": run.status.as_str() });
        self.record(run, "run.finished", payload).await;
    }

    async fn on_run_error(&self, run: &Run, error: &RunError) {
        let payload = json!({
            "status": run.status.as_str(),
            "kind": error.kind(),
            "error": error.to_string(),
        });
        self.record(run, "run.failed", payload).await;
    }
}
