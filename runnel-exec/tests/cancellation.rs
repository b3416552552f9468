use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::{stream, StreamExt};
use runnel_core::{
    json, BoxError, CancellationToken, ConfigurationError, RunError, RunStatus, RunnableConfig,
    Value,
};
use runnel_exec::{DynRunnable, Lambda, Parallel, RunCollector, RunScope, Runnable, RunnableExt};

fn slow(name: &str) -> Lambda {
    Lambda::from_async(|x, _| async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, BoxError>(x)
    })
    .named(name)
}

fn cancel_after(token: &CancellationToken, after: Duration) -> tokio::task::JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        token.cancel();
    })
}

#[tokio::test]
async fn cancelling_a_fan_out_closes_every_run() {
    let token = CancellationToken::new();
    let collector = RunCollector::new();
    let config = RunnableConfig::new()
        .with_cancellation(token.clone())
        .with_handler(Arc::new(collector.clone()));
    let parallel = (0..5).fold(Parallel::new(), |p, i| {
        p.step(format!("k{i}"), slow(&format!("child{i}")))
    });

    let canceller = cancel_after(&token, Duration::from_millis(20));
    let err = parallel.invoke(json!(null), &config).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, RunError::Cancelled));
    let runs = collector.runs().await;
    assert_eq!(runs.len(), 6);
    assert!(runs.iter().all(|r| r.status == RunStatus::Cancelled));
    assert!(collector.with_status(RunStatus::Running).await.is_empty());
}

#[tokio::test]
async fn already_cancelled_config_starts_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let collector = RunCollector::new();
    let config = RunnableConfig::new()
        .with_cancellation(token)
        .with_handler(Arc::new(collector.clone()));

    let err = slow("never").invoke(json!(1), &config).await.unwrap_err();
    assert!(matches!(err, RunError::Cancelled));
    assert!(collector.runs().await.is_empty());
}

#[tokio::test]
async fn cancelling_a_stream_ends_it_with_an_error() {
    let ticker = Lambda::from_stream(|_, _| {
        stream::iter(0..100).then(|i| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, BoxError>(json!([i]))
        })
    });
    let token = CancellationToken::new();
    let config = RunnableConfig::new().with_cancellation(token.clone());

    let canceller = cancel_after(&token, Duration::from_millis(35));
    let items: Vec<_> = ticker.stream(json!(null), &config).collect().await;
    canceller.await.unwrap();

    let (last, chunks) = items.split_last().unwrap();
    assert!(matches!(last, Err(RunError::Cancelled)));
    assert!(chunks.len() < 100);
    assert!(chunks.iter().all(Result::is_ok));
}

#[tokio::test]
async fn timeout_cancels_the_inner_run() {
    let collector = RunCollector::new();
    let caller = CancellationToken::new();
    let config = RunnableConfig::new()
        .with_cancellation(caller.clone())
        .with_handler(Arc::new(collector.clone()));

    let err = slow("inner")
        .with_timeout(Duration::from_millis(30))
        .invoke(json!(null), &config)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(err.is_cancellation());
    assert_eq!(err.to_string(), "run timed out after 30ms");
    assert_eq!(collector.named("inner").await[0].status, RunStatus::Cancelled);
    let outer = collector.roots().await.remove(0);
    assert_eq!(outer.name, "Timeout<inner>");
    assert_eq!(outer.status, RunStatus::Cancelled);
    assert_eq!(outer.error_kind.as_deref(), Some("timeout"));
    assert!(!caller.is_cancelled());
}

#[tokio::test]
async fn timeout_passes_fast_results_through() {
    let out = Lambda::new(|x| Ok(x))
        .with_timeout(Duration::from_secs(5))
        .invoke(json!("quick"), &RunnableConfig::new())
        .await
        .unwrap();
    assert_eq!(out, json!("quick"));
}

#[tokio::test]
async fn timeout_cuts_a_stream_short() {
    let ticker = Lambda::from_stream(|_, _| {
        stream::iter(0..100).then(|i| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, BoxError>(json!([i]))
        })
    });
    let config = RunnableConfig::new();
    let timed = ticker.with_timeout(Duration::from_millis(45));

    let items: Vec<_> = timed.stream(json!(null), &config).collect().await;
    let (last, chunks) = items.split_last().unwrap();
    assert!(matches!(last, Err(RunError::Timeout { .. })));
    assert!(!chunks.is_empty());
    assert!(chunks.len() < 100);
}

/// Waits for cancellation, then fails with its own error while winding down.
struct FailsOnShutdown;

#[async_trait::async_trait]
impl Runnable for FailsOnShutdown {
    fn name(&self) -> String {
        "FailsOnShutdown".to_string()
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, _input: Value, scope: &RunScope) -> Result<Value, RunError> {
        scope.cancellation().cancelled().await;
        Err(RunError::execution("flush failed"))
    }
}

#[tokio::test]
async fn timeout_wins_over_errors_raised_while_winding_down() {
    let collector = RunCollector::new();
    let config = RunnableConfig::new().with_handler(Arc::new(collector.clone()));

    let err = FailsOnShutdown
        .with_timeout(Duration::from_millis(20))
        .invoke(json!(null), &config)
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let inner = collector.named("FailsOnShutdown").await.remove(0);
    assert_eq!(inner.status, RunStatus::Failed);
    assert_eq!(inner.error.as_deref(), Some("flush failed"));

    let err = FailsOnShutdown
        .invoke(json!(null), &RunnableConfig::new().with_timeout(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn config_deadline_cancels_the_call_subtree() {
    let collector = RunCollector::new();
    let caller = CancellationToken::new();
    let config = RunnableConfig::new()
        .with_cancellation(caller.clone())
        .with_timeout(Duration::from_millis(30))
        .with_handler(Arc::new(collector.clone()));
    let fan = Parallel::new()
        .step("a", slow("a"))
        .step("b", slow("b"))
        .named("fan");

    let err = fan.invoke(json!(null), &config).await.unwrap_err();

    assert!(matches!(err, RunError::Timeout { after } if after == Duration::from_millis(30)));
    let runs = collector.runs().await;
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.status == RunStatus::Cancelled));
    let root = collector.roots().await.remove(0);
    assert_eq!(root.name, "fan");
    assert_eq!(root.error_kind.as_deref(), Some("timeout"));
    assert!(!caller.is_cancelled());
}

#[tokio::test]
async fn config_deadline_is_not_inherited_by_nested_calls() {
    let inspect = Lambda::from_async(|_, config: RunnableConfig| async move {
        Ok::<_, BoxError>(json!(config.timeout.map(|t| t.as_millis() as u64)))
    });
    let config = RunnableConfig::new().with_timeout(Duration::from_secs(5));

    let out = inspect.invoke(json!(null), &config).await.unwrap();
    assert_eq!(out, json!(null));
}

#[tokio::test]
async fn config_deadline_cuts_a_stream_short() {
    let ticker = Lambda::from_stream(|_, _| {
        stream::iter(0..100).then(|i| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, BoxError>(json!([i]))
        })
    });
    let collector = RunCollector::new();
    let config = RunnableConfig::new()
        .with_timeout(Duration::from_millis(45))
        .with_handler(Arc::new(collector.clone()));

    let items: Vec<_> = ticker.stream(json!(null), &config).collect().await;
    let (last, chunks) = items.split_last().unwrap();
    assert!(matches!(last, Err(RunError::Timeout { .. })));
    assert!(!chunks.is_empty());
    assert!(chunks.len() < 100);
    let run = collector.roots().await.remove(0);
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.error_kind.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn config_deadline_passes_fast_results_through() {
    let config = RunnableConfig::new().with_timeout(Duration::from_secs(5));
    let out = Lambda::new(|x| Ok(x)).invoke(json!("quick"), &config).await.unwrap();
    assert_eq!(out, json!("quick"));
}

static COUNTDOWN: OnceLock<DynRunnable> = OnceLock::new();

/// Calls itself with `n - 1` until `n` reaches zero.
fn countdown() -> &'static DynRunnable {
    COUNTDOWN.get_or_init(|| {
        Lambda::from_async(|x: Value, config: RunnableConfig| async move {
            let n = x.as_u64().unwrap_or_default();
            if n == 0 {
                return Ok::<_, BoxError>(json!("done"));
            }
            let Some(me) = COUNTDOWN.get() else {
                return Err("countdown not registered".into());
            };
            me.invoke(json!(n - 1), &config).await.map_err(BoxError::from)
        })
        .named("countdown")
        .boxed()
    })
}

#[tokio::test]
async fn recursion_within_the_limit_succeeds() {
    let out = countdown()
        .invoke(json!(3), &RunnableConfig::new())
        .await
        .unwrap();
    assert_eq!(out, json!("done"));
}

#[tokio::test]
async fn recursion_past_the_limit_fails() {
    let collector = RunCollector::new();
    let config = RunnableConfig::new()
        .with_recursion_limit(5)
        .with_handler(Arc::new(collector.clone()));

    let err = countdown().invoke(json!(100), &config).await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Configuration(ConfigurationError::RecursionLimit)
    ));
    assert_eq!(collector.runs().await.len(), 6);
    assert!(collector
        .runs()
        .await
        .iter()
        .all(|r| r.status == RunStatus::Failed));
}
