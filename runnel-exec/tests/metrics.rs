use std::sync::Arc;
use std::time::Duration;

use runnel_core::{json, Run, RunError, RunnableConfig};
use runnel_exec::{Lambda, MetricsCollector, MetricsHandler, Parallel, RunMetrics, Runnable};

#[test]
fn run_metrics_default_is_empty() {
    let metrics = RunMetrics::default();
    assert_eq!(metrics.runs_started, 0);
    assert_eq!(metrics.runs_finished(), 0);
    assert_eq!(metrics.total_duration, Duration::ZERO);
}

#[test]
fn run_metrics_record_success() {
    let mut metrics = RunMetrics::default();
    let mut run = Run::new("step", json!(1));
    run.start();
    metrics.record_start(&run);
    assert_eq!(metrics.in_flight(), 1);
    assert_eq!(metrics.root_runs, 1);

    run.succeed(json!(2));
    metrics.record_finish(&run);
    assert_eq!(metrics.runs_succeeded, 1);
    assert_eq!(metrics.in_flight(), 0);
}

#[test]
fn run_metrics_record_failure_and_cancellation() {
    let mut metrics = RunMetrics::default();

    let mut failed = Run::new("step", json!(null));
    failed.start();
    failed.fail(&RunError::execution("boom"));
    metrics.record_finish(&failed);

    let mut cancelled = Run::new("step", json!(null));
    cancelled.start();
    cancelled.fail(&RunError::Cancelled);
    metrics.record_finish(&cancelled);

    assert_eq!(metrics.runs_failed, 1);
    assert_eq!(metrics.runs_cancelled, 1);
    assert_eq!(metrics.runs_finished(), 2);
}

#[test]
fn run_metrics_ignore_unfinished_runs() {
    let mut metrics = RunMetrics::default();
    let mut run = Run::new("step", json!(null));
    run.start();
    metrics.record_finish(&run);
    assert_eq!(metrics.runs_finished(), 0);
}

#[test]
fn run_metrics_to_json() {
    let mut metrics = RunMetrics::default();
    metrics.record_chunk();
    metrics.record_chunk();
    let value = metrics.to_json();
    assert_eq!(value["chunks"], json!(2));
    assert_eq!(value["runs"]["started"], json!(0));
}

#[tokio::test]
async fn metrics_collector_new() {
    let collector = MetricsCollector::new();
    let metrics = collector.get_metrics().await;
    assert_eq!(metrics.runs_started, 0);
}

#[tokio::test]
async fn metrics_handler_counts_a_run_tree() {
    let collector = MetricsCollector::new();
    let config = RunnableConfig::new().with_handler(Arc::new(MetricsHandler::new(collector.clone())));
    let parallel = Parallel::new()
        .step("ok", Lambda::new(|x| Ok(x)))
        .step("also_ok", Lambda::new(|_| Ok(json!(true))));

    parallel.invoke(json!(1), &config).await.unwrap();
    let failing = Lambda::new(|_| Err("nope".into()));
    failing.invoke(json!(1), &config).await.unwrap_err();

    let metrics = collector.get_metrics().await;
    assert_eq!(metrics.runs_started, 4);
    assert_eq!(metrics.root_runs, 2);
    assert_eq!(metrics.runs_succeeded, 3);
    assert_eq!(metrics.runs_failed, 1);
    assert_eq!(metrics.in_flight(), 0);
}
