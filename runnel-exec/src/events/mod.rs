//! Flattened view of a run tree as a single event stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use runnel_core::{CallbackHandler, Run, RunError, RunnableConfig, Value};
use serde::Serialize;
use serde_json::Map;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::runnable::Runnable;

pub type EventStream<'a> = BoxStream<'a, StreamEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "on_chain_start")]
    Start,
    #[serde(rename = "on_chain_stream")]
    Stream,
    #[serde(rename = "on_chain_end")]
    End,
    #[serde(rename = "on_chain_error")]
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "on_chain_start",
            EventKind::Stream => "on_chain_stream",
            EventKind::End => "on_chain_end",
            EventKind::Error => "on_chain_error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    pub event: EventKind,
    pub run_id: Uuid,
    /// Ancestors of the run, outermost first.
    pub parent_ids: Vec<Uuid>,
    pub name: String,
    /// Names from the outermost run down to this one.
    pub path: Vec<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub data: EventData,
}

/// Selects which runs' events are emitted.
///
/// Exclusions win over inclusions. With no inclusions, every run not
/// excluded passes.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    include_names: Vec<String>,
    include_tags: Vec<String>,
    exclude_names: Vec<String>,
    exclude_tags: Vec<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_name(mut self, name: impl Into<String>) -> Self {
        self.include_names.push(name.into());
        self
    }

    pub fn include_tag(mut self, tag: impl Into<String>) -> Self {
        self.include_tags.push(tag.into());
        self
    }

    pub fn exclude_name(mut self, name: impl Into<String>) -> Self {
        self.exclude_names.push(name.into());
        self
    }

    pub fn exclude_tag(mut self, tag: impl Into<String>) -> Self {
        self.exclude_tags.push(tag.into());
        self
    }

    pub fn allows(&self, name: &str, tags: &[String]) -> bool {
        let tagged = |wanted: &[String]| tags.iter().any(|t| wanted.contains(t));
        if self.exclude_names.iter().any(|n| n == name) || tagged(&self.exclude_tags) {
            return false;
        }
        if self.include_names.is_empty() && self.include_tags.is_empty() {
            return true;
        }
        self.include_names.iter().any(|n| n == name) || tagged(&self.include_tags)
    }
}

#[derive(Debug, Clone, Default)]
struct Lineage {
    parent_ids: Vec<Uuid>,
    path: Vec<String>,
}

/// Callback handler that turns lifecycle hooks into [`StreamEvent`]s.
pub struct EventStreamHandler {
    sender: mpsc::UnboundedSender<StreamEvent>,
    filter: EventFilter,
    lineage: Mutex<HashMap<Uuid, Lineage>>,
}

impl EventStreamHandler {
    pub fn new(sender: mpsc::UnboundedSender<StreamEvent>, filter: EventFilter) -> Self {
        Self {
            sender,
            filter,
            lineage: Mutex::new(HashMap::new()),
        }
    }

    fn lineage(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Lineage>> {
        self.lineage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: EventKind, run: &Run, data: EventData) {
        if !self.filter.allows(&run.name, &run.tags) {
            return;
        }
        let lineage = self.lineage().get(&run.id).cloned().unwrap_or_else(|| Lineage {
            parent_ids: run.parent_run_id.into_iter().collect(),
            path: vec![run.name.clone()],
        });
        // The receiver is gone once the consumer drops the event stream.
        let _ = self.sender.send(StreamEvent {
            event,
            run_id: run.id,
            parent_ids: lineage.parent_ids,
            name: run.name.clone(),
            path: lineage.path,
            tags: run.tags.clone(),
            metadata: run.metadata.clone(),
            data,
        });
    }
}

#[async_trait]
impl CallbackHandler for EventStreamHandler {
    async fn on_run_start(&self, run: &Run) {
        {
            let mut lineage = self.lineage();
            let parent = run.parent_run_id.and_then(|id| lineage.get(&id).cloned().map(|l| (id, l)));
            let entry = match parent {
                Some((parent_id, parent)) => {
                    let mut parent_ids = parent.parent_ids;
                    parent_ids.push(parent_id);
                    let mut path = parent.path;
                    path.push(run.name.clone());
                    Lineage { parent_ids, path }
                }
                None => Lineage {
                    parent_ids: run.parent_run_id.into_iter().collect(),
                    path: vec![run.name.clone()],
                },
            };
            lineage.insert(run.id, entry);
        }
        let data = EventData {
            input: Some(run.inputs.clone()),
            ..EventData::default()
        };
        self.emit(EventKind::Start, run, data);
    }

    async fn on_chunk(&self, run: &Run, chunk: &Value) {
        let data = EventData {
            chunk: Some(chunk.clone()),
            ..EventData::default()
        };
        self.emit(EventKind::Stream, run, data);
    }

    async fn on_run_end(&self, run: &Run) {
        let data = EventData {
            input: Some(run.inputs.clone()),
            output: run.outputs.clone(),
            ..EventData::default()
        };
        self.emit(EventKind::End, run, data);
        self.lineage().remove(&run.id);
    }

    async fn on_run_error(&self, run: &Run, error: &RunError) {
        let data = EventData {
            input: Some(run.inputs.clone()),
            error: Some(error.to_string()),
            ..EventData::default()
        };
        self.emit(EventKind::Error, run, data);
        self.lineage().remove(&run.id);
    }
}

enum Step {
    Event(StreamEvent),
    Progress,
    Done,
}

/// Streams `runnable` with an [`EventStreamHandler`] attached and yields the
/// events of every run in the tree, in dispatch order.
pub fn stream_events<'a, R: Runnable + ?Sized>(
    runnable: &'a R,
    input: Value,
    config: RunnableConfig,
    filter: EventFilter,
) -> EventStream<'a> {
    Box::pin(async_stream::stream! {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let config = config.with_handler(Arc::new(EventStreamHandler::new(sender, filter)));
        let mut chunks = runnable.stream(input, &config);

        loop {
            let step = tokio::select! {
                biased;
                Some(event) = receiver.recv() => Step::Event(event),
                next = chunks.next() => match next {
                    Some(_) => Step::Progress,
                    None => Step::Done,
                },
            };
            match step {
                Step::Event(event) => {
                    yield event;
                }
                Step::Progress => {}
                Step::Done => break,
            }
        }

        // Handlers run inline, so every event is already queued.
        while let Ok(event) = receiver.try_recv() {
            yield event;
        }
    })
}
