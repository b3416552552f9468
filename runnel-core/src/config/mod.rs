use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::callbacks::{CallbackHandler, CallbackManager};
use crate::error::ConfigurationError;

pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Options that travel with every call and flow down the run tree.
///
/// Keys the engine does not understand live in `configurable` and are passed
/// through untouched.
#[derive(Debug, Clone, Default)]
pub struct RunnableConfig {
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub callbacks: CallbackManager,
    pub max_concurrency: Option<usize>,
    pub recursion_limit: Option<usize>,
    pub cancellation: Option<CancellationToken>,
    /// Deadline for the next call made with this config. The call turns it
    /// into a cancellation of its own subtree, so nested calls never see it.
    pub timeout: Option<Duration>,
    pub run_name: Option<String>,
    pub run_id: Option<Uuid>,
    pub configurable: Map<String, Value>,
}

impl RunnableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        push_unique(&mut self.tags, tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            push_unique(&mut self.tags, tag.into());
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn CallbackHandler>) -> Self {
        self.callbacks.add_handler(handler);
        self
    }

    pub fn with_callbacks(mut self, callbacks: CallbackManager) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_timeout(mut self, after: Duration) -> Self {
        self.timeout = Some(after);
        self
    }

    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_configurable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configurable.insert(key.into(), value);
        self
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit.unwrap_or(DEFAULT_RECURSION_LIMIT)
    }

    /// The cancellation token shared by this call tree. Calls made without one
    /// get a fresh token that nobody else can trigger.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone().unwrap_or_default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Fills in the defaults a top-level call needs.
    pub fn ensure(mut self) -> Self {
        if self.cancellation.is_none() {
            self.cancellation = Some(CancellationToken::new());
        }
        if self.recursion_limit.is_none() {
            self.recursion_limit = Some(DEFAULT_RECURSION_LIMIT);
        }
        self
    }

    /// Layers `inner` over `self`.
    ///
    /// Scalars set in `inner` win. Tags, metadata, configurable keys and
    /// callback handlers are unioned, with `inner` winning on key conflicts.
    /// An existing cancellation token is kept, so a bound runnable cannot
    /// detach itself from its caller's cancellation.
    pub fn merge(&self, inner: &RunnableConfig) -> RunnableConfig {
        let mut merged = self.clone();
        for tag in &inner.tags {
            push_unique(&mut merged.tags, tag.clone());
        }
        for (key, value) in &inner.metadata {
            merged.metadata.insert(key.clone(), value.clone());
        }
        for (key, value) in &inner.configurable {
            merged.configurable.insert(key.clone(), value.clone());
        }
        merged.callbacks = self.callbacks.merge(&inner.callbacks);
        merged.max_concurrency = inner.max_concurrency.or(self.max_concurrency);
        merged.recursion_limit = inner.recursion_limit.or(self.recursion_limit);
        merged.timeout = inner.timeout.or(self.timeout);
        merged.run_name = inner.run_name.clone().or_else(|| self.run_name.clone());
        merged.run_id = inner.run_id.or(self.run_id);
        merged.cancellation = self
            .cancellation
            .clone()
            .or_else(|| inner.cancellation.clone());
        merged
    }

    /// The context handed to runnables nested under the run `parent_run_id`.
    ///
    /// Run naming and the deadline do not inherit, and each level of nesting
    /// spends one unit of the recursion budget.
    pub fn child(&self, parent_run_id: Uuid) -> RunnableConfig {
        let mut child = self.clone();
        child.callbacks = self.callbacks.for_child(parent_run_id);
        child.timeout = None;
        child.run_name = None;
        child.run_id = None;
        child.recursion_limit = Some(self.recursion_limit().saturating_sub(1));
        child
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(after) => {
                let ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
                serializer.serialize_u64(ms)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

fn push_unique(tags: &mut Vec<String>, tag: String) {
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// Serializable subset of [`RunnableConfig`], as read from a config file.
///
/// Unknown top-level keys are collected into `extra` and end up in
/// `configurable`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOptions {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, alias = "maxConcurrency", skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default, alias = "recursionLimit", skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<usize>,
    /// Milliseconds.
    #[serde(default, with = "millis", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, alias = "runName", skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    #[serde(default, alias = "runId", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(default)]
    pub configurable: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TryFrom<ConfigOptions> for RunnableConfig {
    type Error = ConfigurationError;

    fn try_from(options: ConfigOptions) -> Result<Self, Self::Error> {
        if options.max_concurrency == Some(0) {
            return Err(ConfigurationError::InvalidOption {
                field: "max_concurrency".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }
        if options.recursion_limit == Some(0) {
            return Err(ConfigurationError::InvalidOption {
                field: "recursion_limit".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }
        if options.timeout == Some(Duration::ZERO) {
            return Err(ConfigurationError::InvalidOption {
                field: "timeout".to_string(),
                message: "must be a positive number of milliseconds".to_string(),
            });
        }
        let mut configurable = options.configurable;
        for (key, value) in options.extra {
            configurable.entry(key).or_insert(value);
        }
        Ok(RunnableConfig {
            tags: options.tags,
            metadata: options.metadata,
            callbacks: CallbackManager::new(),
            max_concurrency: options.max_concurrency,
            recursion_limit: options.recursion_limit,
            cancellation: None,
            timeout: options.timeout,
            run_name: options.run_name,
            run_id: options.run_id,
            configurable,
        })
    }
}
