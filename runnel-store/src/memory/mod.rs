use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use runnel_core::Run;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{NewEvent, RunEvent, RunStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    runs: Vec<Run>,
    index: HashMap<Uuid, usize>,
    events: Vec<RunEvent>,
}

/// Process-local [`RunStore`]; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    tables: RwLock<Tables>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.len()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn upsert_run(&self, run: &Run) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        match tables.index.get(&run.id).copied() {
            Some(pos) => {
                let stored = &mut tables.runs[pos];
                if stored.status.is_terminal() && *stored != *run {
                    return Err(StoreError::RunFinished {
                        run_id: run.id,
                        status: stored.status,
                    });
                }
                *stored = run.clone();
            }
            None => {
                let pos = tables.runs.len();
                tables.runs.push(run.clone());
                tables.index.insert(run.id, pos);
            }
        }
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.index.get(&run_id).map(|&pos| tables.runs[pos].clone()))
    }

    async fn children_of(&self, parent_run_id: Uuid) -> Result<Vec<Run>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .iter()
            .filter(|run| run.parent_run_id == Some(parent_run_id))
            .cloned()
            .collect())
    }

    async fn runs(&self) -> Result<Vec<Run>, StoreError> {
        Ok(self.tables.read().await.runs.clone())
    }

    async fn append_event(&self, event: NewEvent) -> Result<RunEvent, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.index.contains_key(&event.run_id) {
            return Err(StoreError::RunNotFound(event.run_id));
        }
        let stored = RunEvent {
            id: tables.events.len() as i64 + 1,
            run_id: event.run_id,
            ts: Utc::now(),
            event_type: event.event_type,
            payload: event.payload,
        };
        tables.events.push(stored.clone());
        Ok(stored)
    }

    async fn events_for(&self, run_id: Uuid) -> Result<Vec<RunEvent>, StoreError> {
        self.events_after(run_id, 0, usize::MAX).await
    }

    async fn events_after(
        &self,
        run_id: Uuid,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RunEvent>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|event| event.run_id == run_id && event.id > after_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
