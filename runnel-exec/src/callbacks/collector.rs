use std::sync::Arc;

use async_trait::async_trait;
use runnel_core::{CallbackHandler, Run, RunError, RunStatus, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Collected {
    runs: Vec<Run>,
    chunks: Vec<(Uuid, Value)>,
}

/// Keeps every run it sees, updated in place as runs progress.
///
/// Runs are listed in start order. Cheap to clone; clones share storage.
#[derive(Debug, Clone, Default)]
pub struct RunCollector {
    inner: Arc<Mutex<Collected>>,
}

impl RunCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn runs(&self) -> Vec<Run> {
        self.inner.lock().await.runs.clone()
    }

    pub async fn run(&self, run_id: Uuid) -> Option<Run> {
        self.inner.lock().await.runs.iter().find(|r| r.id == run_id).cloned()
    }

    pub async fn roots(&self) -> Vec<Run> {
        self.filtered(|r| r.is_root()).await
    }

    pub async fn children_of(&self, parent_run_id: Uuid) -> Vec<Run> {
        self.filtered(|r| r.parent_run_id == Some(parent_run_id)).await
    }

    pub async fn named(&self, name: &str) -> Vec<Run> {
        self.filtered(|r| r.name == name).await
    }

    pub async fn with_status(&self, status: RunStatus) -> Vec<Run> {
        self.filtered(|r| r.status == status).await
    }

    pub async fn chunks_of(&self, run_id: Uuid) -> Vec<Value> {
        self.inner
            .lock()
            .await
            .chunks
            .iter()
            .filter(|(id, _)| *id == run_id)
            .map(|(_, chunk)| chunk.clone())
            .collect()
    }

    async fn filtered(&self, keep: impl Fn(&Run) -> bool) -> Vec<Run> {
        self.inner.lock().await.runs.iter().filter(|r| keep(r)).cloned().collect()
    }

    async fn upsert(&self, run: &Run) {
        let mut inner = self.inner.lock().await;
        match inner.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => inner.runs.push(run.clone()),
        }
    }
}

#[async_trait]
impl CallbackHandler for RunCollector {
    async fn on_run_start(&self, run: &Run) {
        self.upsert(run).await;
    }

    async fn on_run_end(&self, run: &Run) {
        self.upsert(run).await;
    }

    async fn on_run_error(&self, run: &Run, _error: &RunError) {
        self.upsert(run).await;
    }

    async fn on_chunk(&self, run: &Run, chunk: &Value) {
        self.inner.lock().await.chunks.push((run.id, chunk.clone()));
    }
}
