use async_trait::async_trait;
use futures_util::StreamExt;
use runnel_core::{ConfigurationError, RunError, Value};

use crate::runnable::{ChunkStream, DynRunnable, RunScope, Runnable, RunnableExt};

/// Feeds each step's output into the next.
///
/// When streamed, only the last step streams; earlier steps are invoked.
#[derive(Clone)]
pub struct Sequence {
    steps: Vec<DynRunnable>,
    name: Option<String>,
}

impl Sequence {
    pub fn new(steps: Vec<DynRunnable>) -> Result<Self, ConfigurationError> {
        if steps.is_empty() {
            return Err(ConfigurationError::EmptySequence);
        }
        Ok(Self::from_steps(steps))
    }

    pub(crate) fn from_steps(steps: Vec<DynRunnable>) -> Self {
        Self { steps, name: None }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn steps(&self) -> &[DynRunnable] {
        &self.steps
    }

    /// Appends `next` as a new last step instead of nesting sequences.
    pub fn pipe<R: Runnable + 'static>(mut self, next: R) -> Sequence {
        self.steps.push(next.boxed());
        self
    }
}

fn step_tag(index: usize) -> Option<String> {
    Some(format!("seq:step:{}", index + 1))
}

#[async_trait]
impl Runnable for Sequence {
    fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "Sequence".to_string())
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let mut value = input;
        for (index, step) in self.steps.iter().enumerate() {
            value = step.invoke(value, &scope.child_config(step_tag(index))).await?;
        }
        Ok(value)
    }

    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        Box::pin(async_stream::stream! {
            let Some((last, init)) = self.steps.split_last() else {
                yield Ok(input);
                return;
            };
            let mut value = input;
            for (index, step) in init.iter().enumerate() {
                match step.invoke(value, &scope.child_config(step_tag(index))).await {
                    Ok(output) => value = output,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }
            let config = scope.child_config(step_tag(init.len()));
            let mut chunks = last.stream(value, &config);
            while let Some(chunk) = chunks.next().await {
                yield chunk;
            }
        })
    }
}
