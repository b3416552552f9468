use async_trait::async_trait;
use futures_util::stream::FuturesOrdered;
use futures_util::StreamExt;
use runnel_core::{ConfigurationError, RunError, Value};

use crate::executor::batch::{job_config, settle, Job};
use crate::executor::concurrency::ConcurrencyLimit;
use crate::runnable::{ChunkStream, DynRunnable, RunScope, Runnable};

/// Applies one runnable to every element of a list input.
#[derive(Clone)]
pub struct Each {
    inner: DynRunnable,
}

impl Each {
    pub fn new(inner: DynRunnable) -> Self {
        Self { inner }
    }
}

fn index_tag(index: usize) -> Option<String> {
    Some(format!("map:key:{index}"))
}

fn expect_list(input: Value) -> Result<Vec<Value>, RunError> {
    match input {
        Value::Array(items) => Ok(items),
        other => Err(ConfigurationError::InvalidInput {
            runnable: "Each".to_string(),
            message: format!("expected an array, got {}", runnel_core::chunk::kind(&other)),
        }
        .into()),
    }
}

#[async_trait]
impl Runnable for Each {
    fn name(&self) -> String {
        format!("Each<{}>", self.inner.name())
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let items = expect_list(input)?;
        let limit = ConcurrencyLimit::from_config(scope.config());
        let jobs = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| Job {
                runnable: &*self.inner,
                input: item,
                config: job_config(scope.config(), index_tag(index)),
            })
            .collect();

        let settled = settle(jobs, &limit, true).await;
        if let Some(err) = settled.first_error {
            return Err(err);
        }
        settled.results.into_iter().collect::<Result<Vec<_>, _>>().map(Value::Array)
    }

    /// Emits `[output]` per element in list order, so the merged chunks
    /// rebuild the output list. An empty list emits one `[]` chunk.
    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        Box::pin(async_stream::stream! {
            let items = match expect_list(input) {
                Ok(items) => items,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            if items.is_empty() {
                yield Ok(Value::Array(Vec::new()));
                return;
            }
            let limit = ConcurrencyLimit::from_config(scope.config());
            let configs: Vec<_> = (0..items.len())
                .map(|index| job_config(scope.config(), index_tag(index)))
                .collect();
            let tokens: Vec<_> = configs.iter().map(|c| c.cancellation_token()).collect();
            let mut ordered: FuturesOrdered<_> = items
                .into_iter()
                .zip(&configs)
                .map(|(item, config)| {
                    let limit = &limit;
                    let inner = &self.inner;
                    async move {
                        let _permit = limit.acquire(&config.cancellation_token()).await?;
                        inner.invoke(item, config).await
                    }
                })
                .collect();
            let mut first_error = None;

            while let Some(result) = ordered.next().await {
                match result {
                    Ok(output) if first_error.is_none() => {
                        yield Ok(Value::Array(vec![output]));
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
            }
        })
    }
}
