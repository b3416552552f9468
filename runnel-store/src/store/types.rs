use chrono::{DateTime, Utc};
use runnel_core::Run;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub run_id: Uuid,
    pub event_type: String,
    pub payload: JsonValue,
}

impl NewEvent {
    pub fn new(run_id: Uuid, event_type: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            run_id,
            event_type: event_type.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    pub id: i64,
    pub run_id: Uuid,
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub payload: JsonValue,
}

/// A stored run with its descendants, children in start order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTree {
    pub run: Run,
    pub children: Vec<RunTree>,
}

#[allow(clippy::len_without_is_empty)]
impl RunTree {
    /// Number of runs in the tree, this one included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(RunTree::len).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(RunTree::depth).max().unwrap_or(0)
    }

    /// Pre-order walk: each run before its children.
    pub fn walk(&self) -> Vec<&Run> {
        let mut out = vec![&self.run];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    pub fn find(&self, name: &str) -> Option<&RunTree> {
        if self.run.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }
}
