use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use runnel_core::{RunError, Value};
use serde_json::Map;

use crate::executor::batch::{job_config, settle, Job};
use crate::executor::concurrency::ConcurrencyLimit;
use crate::runnable::{ChunkStream, DynRunnable, RunScope, Runnable, RunnableExt};

/// Runs every step on the same input concurrently and collects the outputs
/// under the steps' keys.
///
/// The first failing step cancels its siblings; the error is returned once
/// all of them have settled and no partial map is produced.
#[derive(Clone, Default)]
pub struct Parallel {
    steps: Vec<(String, DynRunnable)>,
    name: Option<String>,
}

impl Parallel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step, replacing any step already registered under `key`.
    pub fn step<R: Runnable + 'static>(mut self, key: impl Into<String>, runnable: R) -> Self {
        let key = key.into();
        let runnable = runnable.boxed();
        match self.steps.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = runnable,
            None => self.steps.push((key, runnable)),
        }
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|(k, _)| k.as_str())
    }
}

fn key_tag(key: &str) -> Option<String> {
    Some(format!("map:key:{key}"))
}

fn keyed(key: &str, chunk: Value) -> Value {
    let mut wrapped = Map::new();
    wrapped.insert(key.to_string(), chunk);
    Value::Object(wrapped)
}

#[async_trait]
impl Runnable for Parallel {
    fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "Parallel".to_string())
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let limit = ConcurrencyLimit::from_config(scope.config());
        let jobs = self
            .steps
            .iter()
            .map(|(key, step)| Job {
                runnable: &**step,
                input: input.clone(),
                config: job_config(scope.config(), key_tag(key)),
            })
            .collect();

        let settled = settle(jobs, &limit, true).await;
        if let Some(err) = settled.first_error {
            return Err(err);
        }
        let mut outputs = Map::new();
        for ((key, _), result) in self.steps.iter().zip(settled.results) {
            outputs.insert(key.clone(), result?);
        }
        Ok(Value::Object(outputs))
    }

    /// Interleaves the steps' chunks, each wrapped as `{key: chunk}`. A step
    /// that finishes without a chunk contributes `{key: null}`, and with no
    /// steps a single `{}` chunk stands for the empty map.
    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        Box::pin(async_stream::stream! {
            if self.steps.is_empty() {
                yield Ok(Value::Object(Map::new()));
                return;
            }
            let configs: Vec<_> = self
                .steps
                .iter()
                .map(|(key, _)| job_config(scope.config(), key_tag(key)))
                .collect();
            let tokens: Vec<_> = configs.iter().map(|c| c.cancellation_token()).collect();
            let streams = self
                .steps
                .iter()
                .zip(&configs)
                .enumerate()
                .map(|(index, ((_, step), config))| {
                    step.stream(input.clone(), config)
                        .map(move |item| (index, item))
                        .boxed()
                });
            let mut merged = stream::select_all(streams);
            let mut silent = vec![true; self.steps.len()];
            let mut first_error = None;

            while let Some((index, item)) = merged.next().await {
                match item {
                    Ok(chunk) if first_error.is_none() => {
                        silent[index] = false;
                        yield Ok(keyed(&self.steps[index].0, chunk));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if first_error.is_none() {
                            tokens.iter().for_each(|t| t.cancel());
                            first_error = Some(err);
                        }
                    }
                }
            }
            if let Some(err) = first_error {
                yield Err(err);
                return;
            }
            for (index, _) in silent.iter().enumerate().filter(|(_, silent)| **silent) {
                yield Ok(keyed(&self.steps[index].0, Value::Null));
            }
        })
    }
}
