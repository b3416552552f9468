use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// One node of the run tree: a single execution of a single runnable.
///
/// Status only moves forward: `Pending -> Running -> {Succeeded, Failed, Cancelled}`.
/// The transition methods return `false` and leave the run untouched when
/// asked to move any other way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub parent_run_id: Option<Uuid>,
    pub name: String,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

impl Run {
    pub fn new(name: impl Into<String>, inputs: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_run_id: None,
            name: name.into(),
            tags: Vec::new(),
            metadata: Map::new(),
            status: RunStatus::Pending,
            start_time: None,
            end_time: None,
            inputs,
            outputs: None,
            error: None,
            error_kind: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_parent(mut self, parent_run_id: Option<Uuid>) -> Self {
        self.parent_run_id = parent_run_id;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_run_id.is_none()
    }

    pub fn start(&mut self) -> bool {
        if self.status != RunStatus::Pending {
            return false;
        }
        self.status = RunStatus::Running;
        self.start_time = Some(Utc::now());
        true
    }

    pub fn succeed(&mut self, outputs: Value) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.status = RunStatus::Succeeded;
        self.outputs = Some(outputs);
        self.end_time = Some(Utc::now());
        true
    }

    /// Cancellation-family errors end the run as `Cancelled`, everything else as `Failed`.
    pub fn fail(&mut self, error: &RunError) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.status = if error.is_cancellation() {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind().to_string());
        self.end_time = Some(Utc::now());
        true
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
