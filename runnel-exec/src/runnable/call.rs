use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use runnel_core::{
    ChunkAccumulator, ConfigurationError, Run, RunError, RunManager, RunnableConfig, Value,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runnable::{ChunkStream, RunScope, Runnable};

/// Opens a run for `runnable`, or reports why it cannot start.
async fn open_run<R: Runnable + ?Sized>(
    runnable: &R,
    input: &Value,
    config: &RunnableConfig,
) -> Result<(RunManager, RunScope), RunError> {
    if config.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    let name = config.run_name.clone().unwrap_or_else(|| runnable.name());
    let mut run = Run::new(name, input.clone())
        .with_tags(config.tags.clone())
        .with_metadata(config.metadata.clone());
    if let Some(run_id) = config.run_id {
        run = run.with_id(run_id);
    }
    let manager = config.callbacks.start_run(run).await;

    if config.recursion_limit() == 0 {
        debug!(run_id = %manager.run_id(), "recursion limit reached");
        let err = RunError::from(ConfigurationError::RecursionLimit);
        manager.error(&err).await;
        return Err(err);
    }

    let scope = RunScope::new(manager.run_id(), config.child(manager.run_id()));
    Ok((manager, scope))
}

/// Moves a configured deadline onto a child token, so expiry cancels this
/// call's subtree without touching the caller.
fn arm_deadline(config: &mut RunnableConfig) -> Option<(Duration, CancellationToken)> {
    let after = config.timeout.take()?;
    let token = config.cancellation_token().child_token();
    config.cancellation = Some(token.clone());
    Some((after, token))
}

/// Races `body` against `after`.
///
/// On expiry `token` is cancelled and `body` is still driven to completion so
/// every run it opened can close; its result is then replaced by
/// [`RunError::Timeout`].
pub(crate) async fn with_deadline<F>(
    body: F,
    after: Duration,
    token: &CancellationToken,
) -> Result<Value, RunError>
where
    F: Future<Output = Result<Value, RunError>>,
{
    tokio::pin!(body);
    tokio::select! {
        result = &mut body => result,
        _ = tokio::time::sleep(after) => {
            debug!(after_ms = after.as_millis() as u64, "deadline reached, cancelling");
            token.cancel();
            match body.await {
                Ok(_) => debug!("discarding output produced after the deadline"),
                Err(err) => {
                    debug!(error = %err, kind = err.kind(), "discarding error raised after the deadline");
                }
            }
            Err(RunError::Timeout { after })
        }
    }
}

/// Runs `runnable.execute` inside its own run.
pub async fn invoke_with_run<R: Runnable + ?Sized>(
    runnable: &R,
    input: Value,
    config: &RunnableConfig,
) -> Result<Value, RunError> {
    let mut config = config.clone().ensure();
    let deadline = arm_deadline(&mut config);
    let (manager, scope) = open_run(runnable, &input, &config).await?;
    let token = config.cancellation_token();

    let body = async {
        if runnable.preemptible() {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(RunError::Cancelled),
                result = runnable.execute(input, &scope) => result,
            }
        } else {
            runnable.execute(input, &scope).await
        }
    };
    let outcome = match &deadline {
        Some((after, deadline_token)) => with_deadline(body, *after, deadline_token).await,
        None => body.await,
    };

    match outcome {
        Ok(output) => {
            manager.end(output.clone()).await;
            Ok(output)
        }
        Err(err) => {
            manager.error(&err).await;
            Err(err)
        }
    }
}

enum Step {
    Chunk(Result<Value, RunError>),
    Done,
    Expired,
}

async fn expiry(after: Option<Duration>) {
    match after {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

/// Runs `runnable.execute_stream` inside its own run, reporting every chunk
/// and closing the run with the merge of all chunks.
pub fn stream_with_run<'a, R: Runnable + ?Sized>(
    runnable: &'a R,
    input: Value,
    config: RunnableConfig,
) -> ChunkStream<'a> {
    Box::pin(async_stream::stream! {
        let mut config = config.ensure();
        let deadline = arm_deadline(&mut config);
        let (manager, scope) = match open_run(runnable, &input, &config).await {
            Ok(opened) => opened,
            Err(err) => {
                yield Err(err);
                return;
            }
        };
        let token = config.cancellation_token();
        let preemptible = runnable.preemptible();
        let expires = expiry(deadline.as_ref().map(|(after, _)| *after));
        tokio::pin!(expires);
        let mut chunks = runnable.execute_stream(input, &scope);
        let mut merged = ChunkAccumulator::new();

        loop {
            let step = tokio::select! {
                biased;
                _ = token.cancelled(), if preemptible => Step::Chunk(Err(RunError::Cancelled)),
                _ = &mut expires => Step::Expired,
                next = chunks.next() => next.map_or(Step::Done, Step::Chunk),
            };

            match step {
                Step::Done => break,
                Step::Chunk(Ok(chunk)) => {
                    if let Err(merge_err) = merged.push(&chunk) {
                        let err = RunError::from(merge_err);
                        manager.error(&err).await;
                        yield Err(err);
                        return;
                    }
                    manager.on_chunk(&chunk).await;
                    yield Ok(chunk);
                }
                Step::Chunk(Err(err)) => {
                    manager.error(&err).await;
                    yield Err(err);
                    return;
                }
                Step::Expired => {
                    let Some((after, deadline_token)) = &deadline else {
                        continue;
                    };
                    debug!(after_ms = after.as_millis() as u64, "deadline reached, cancelling");
                    deadline_token.cancel();
                    if !preemptible {
                        while chunks.next().await.is_some() {}
                    }
                    let err = RunError::Timeout { after: *after };
                    manager.error(&err).await;
                    yield Err(err);
                    return;
                }
            }
        }

        manager.end(merged.finish()).await;
    })
}
