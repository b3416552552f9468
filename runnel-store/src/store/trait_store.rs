use async_trait::async_trait;
use runnel_core::{Run, RunStatus};
use uuid::Uuid;

use crate::store::types::{NewEvent, RunEvent};

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert the run, or replace the stored copy with this newer state.
    ///
    /// A run that already reached a terminal status may only be rewritten
    /// with an identical copy.
    async fn upsert_run(&self, run: &Run) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, StoreError>;

    /// Direct children of a run, in start order.
    async fn children_of(&self, parent_run_id: Uuid) -> Result<Vec<Run>, StoreError>;

    /// Every stored run, in start order.
    async fn runs(&self) -> Result<Vec<Run>, StoreError>;

    /// Append-only; the run must already be stored.
    async fn append_event(&self, event: NewEvent) -> Result<RunEvent, StoreError>;

    async fn events_for(&self, run_id: Uuid) -> Result<Vec<RunEvent>, StoreError>;

    /// Events of one run with an id above `after_id`, oldest first.
    async fn events_after(
        &self,
        run_id: Uuid,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RunEvent>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),
    #[error("run {run_id} already finished as {}", .status.as_str())]
    RunFinished { run_id: Uuid, status: RunStatus },
    #[error("store error: {0}")]
    Other(String),
}
