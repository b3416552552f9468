use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use runnel_core::{AggregateError, RunError, Value};
use tracing::warn;

use crate::retry::RetryPredicate;
use crate::runnable::{ChunkStream, DynRunnable, RunScope, Runnable};

/// Tries the primary runnable, then each fallback in order, until one succeeds.
///
/// Cancellation is never handled: it propagates at once. When every
/// alternative fails the result is an [`AggregateError`] holding each error
/// in attempt order.
#[derive(Clone)]
pub struct Fallback {
    primary: DynRunnable,
    fallbacks: Vec<DynRunnable>,
    handle_if: Option<RetryPredicate>,
    exception_key: Option<String>,
}

impl Fallback {
    pub fn new(primary: DynRunnable, fallbacks: Vec<DynRunnable>) -> Self {
        Self {
            primary,
            fallbacks,
            handle_if: None,
            exception_key: None,
        }
    }

    /// Only errors matching `predicate` move on to the next alternative;
    /// anything else propagates unchanged.
    pub fn handle_if(mut self, predicate: impl Fn(&RunError) -> bool + Send + Sync + 'static) -> Self {
        self.handle_if = Some(Arc::new(predicate));
        self
    }

    /// With an object input, the previous alternative's error message is
    /// written under `key` before the next alternative runs.
    pub fn exception_key(mut self, key: impl Into<String>) -> Self {
        self.exception_key = Some(key.into());
        self
    }

    fn alternatives(&self) -> impl Iterator<Item = &DynRunnable> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    fn handles(&self, error: &RunError) -> bool {
        if error.is_cancellation() {
            return false;
        }
        self.handle_if.as_ref().map_or(true, |predicate| predicate(error))
    }

    fn record(&self, input: &mut Value, error: &RunError) {
        if let (Some(key), Value::Object(map)) = (&self.exception_key, input) {
            map.insert(key.clone(), Value::String(error.to_string()));
        }
    }
}

fn attempt_tag(index: usize) -> Option<String> {
    (index > 0).then(|| format!("fallback:{index}"))
}

#[async_trait]
impl Runnable for Fallback {
    fn name(&self) -> String {
        format!("Fallback<{}>", self.primary.name())
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let mut input = input;
        let mut errors = Vec::new();
        for (index, candidate) in self.alternatives().enumerate() {
            if scope.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            match candidate
                .invoke(input.clone(), &scope.child_config(attempt_tag(index)))
                .await
            {
                Ok(output) => return Ok(output),
                Err(err) if !self.handles(&err) => return Err(err),
                Err(err) => {
                    warn!(alternative = index, error = %err, "alternative failed");
                    self.record(&mut input, &err);
                    errors.push(err);
                }
            }
        }
        Err(AggregateError::new(errors).into())
    }

    /// An alternative is committed to once it yields its first chunk; only
    /// failures before that point fall through to the next one.
    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        Box::pin(async_stream::stream! {
            let mut input = input;
            let mut errors = Vec::new();
            for (index, candidate) in self.alternatives().enumerate() {
                if scope.is_cancelled() {
                    yield Err(RunError::Cancelled);
                    return;
                }
                let config = scope.child_config(attempt_tag(index));
                let mut chunks = candidate.stream(input.clone(), &config);
                match chunks.next().await {
                    None => return,
                    Some(Ok(first)) => {
                        yield Ok(first);
                        while let Some(chunk) = chunks.next().await {
                            yield chunk;
                        }
                        return;
                    }
                    Some(Err(err)) if !self.handles(&err) => {
                        yield Err(err);
                        return;
                    }
                    Some(Err(err)) => {
                        warn!(alternative = index, error = %err, "alternative failed");
                        self.record(&mut input, &err);
                        errors.push(err);
                    }
                }
            }
            yield Err(AggregateError::new(errors).into());
        })
    }
}
