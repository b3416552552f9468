use futures_util::stream::{BoxStream, FuturesUnordered};
use futures_util::StreamExt;
use runnel_core::{ConfigurationError, RunError, RunnableConfig, Value};
use tracing::debug;

use crate::executor::concurrency::ConcurrencyLimit;
use crate::runnable::Runnable;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Overrides the config's `max_concurrency` for this batch.
    pub max_concurrency: Option<usize>,
    /// Keep going past failures and report them per item instead of failing
    /// the whole batch.
    pub return_exceptions: bool,
}

impl BatchOptions {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn return_exceptions(mut self) -> Self {
        self.return_exceptions = true;
        self
    }
}

/// One unit of a fan-out. `config` must carry a cancellation token owned by
/// this job so that a failing sibling can stop it.
pub(crate) struct Job<'a, R: ?Sized> {
    pub runnable: &'a R,
    pub input: Value,
    pub config: RunnableConfig,
}

pub(crate) struct Settled {
    pub results: Vec<Result<Value, RunError>>,
    pub first_error: Option<RunError>,
}

/// Drives every job to completion under `limit`, returning results in job
/// order. With `fail_fast`, the first error cancels all other jobs; this
/// still waits for them to settle.
pub(crate) async fn settle<R: Runnable + ?Sized>(
    jobs: Vec<Job<'_, R>>,
    limit: &ConcurrencyLimit,
    fail_fast: bool,
) -> Settled {
    let tokens: Vec<_> = jobs.iter().map(|job| job.config.cancellation_token()).collect();
    let mut results: Vec<Option<Result<Value, RunError>>> = jobs.iter().map(|_| None).collect();
    let mut first_error = None;

    let mut pending: FuturesUnordered<_> = jobs
        .into_iter()
        .enumerate()
        .map(|(index, job)| async move {
            let token = job.config.cancellation_token();
            let result = match limit.acquire(&token).await {
                Ok(_permit) => job.runnable.invoke(job.input, &job.config).await,
                Err(err) => Err(err),
            };
            (index, result)
        })
        .collect();

    while let Some((index, result)) = pending.next().await {
        if let Err(err) = &result {
            if first_error.is_none() {
                if fail_fast {
                    debug!(index, error = %err, "fan-out item failed, cancelling siblings");
                    tokens.iter().for_each(|t| t.cancel());
                }
                first_error = Some(err.clone());
            }
        }
        results[index] = Some(result);
    }

    Settled {
        results: results
            .into_iter()
            .map(|r| r.unwrap_or(Err(RunError::Cancelled)))
            .collect(),
        first_error,
    }
}

pub(crate) fn job_config(base: &RunnableConfig, tag: Option<String>) -> RunnableConfig {
    let token = base.cancellation_token().child_token();
    let config = match tag {
        Some(tag) => base.clone().with_tag(tag),
        None => base.clone(),
    };
    config.with_cancellation(token)
}

pub async fn batch_with_configs<R: Runnable + ?Sized>(
    runnable: &R,
    inputs: Vec<Value>,
    configs: Vec<RunnableConfig>,
    options: BatchOptions,
) -> Result<Vec<Result<Value, RunError>>, RunError> {
    if inputs.len() != configs.len() {
        return Err(ConfigurationError::BatchConfigMismatch {
            inputs: inputs.len(),
            configs: configs.len(),
        }
        .into());
    }
    let Some(first) = configs.first() else {
        return Ok(Vec::new());
    };
    let limit = ConcurrencyLimit::new(options.max_concurrency.or(first.max_concurrency));

    let jobs = inputs
        .into_iter()
        .zip(configs)
        .map(|(input, config)| Job {
            runnable,
            input,
            config: job_config(&config.ensure(), None),
        })
        .collect();

    let settled = settle(jobs, &limit, !options.return_exceptions).await;
    match settled.first_error {
        Some(err) if !options.return_exceptions => Err(err),
        _ => Ok(settled.results),
    }
}

pub fn batch_as_completed<'a, R: Runnable + ?Sized>(
    runnable: &'a R,
    inputs: Vec<Value>,
    config: RunnableConfig,
) -> BoxStream<'a, (usize, Result<Value, RunError>)> {
    Box::pin(async_stream::stream! {
        let config = config.ensure();
        let limit = ConcurrencyLimit::from_config(&config);
        let token = config.cancellation_token();
        let mut pending: FuturesUnordered<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let limit = &limit;
                let token = &token;
                let config = &config;
                async move {
                    let result = match limit.acquire(token).await {
                        Ok(_permit) => runnable.invoke(input, config).await,
                        Err(err) => Err(err),
                    };
                    (index, result)
                }
            })
            .collect();
        while let Some(item) = pending.next().await {
            yield item;
        }
    })
}
