use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use runnel_core::{json, BoxError, ConfigurationError, RunError, RunStatus, RunnableConfig, Value};
use runnel_exec::{Each, Lambda, Parallel, Passthrough, RunCollector, Runnable, RunnableExt};

fn sleepy(ms: u64, output: Value) -> Lambda {
    Lambda::from_async(move |_, _| {
        let output = output.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, BoxError>(output)
        }
    })
}

#[tokio::test]
async fn parallel_collects_outputs_by_key() {
    let parallel = Parallel::new()
        .step("a", Passthrough)
        .step("b", Lambda::new(|x| Ok(json!(x.as_str().map(str::len).unwrap_or_default()))));

    let out = parallel.invoke(json!("hi"), &RunnableConfig::new()).await.unwrap();
    assert_eq!(out, json!({"a": "hi", "b": 2}));
}

#[tokio::test]
async fn parallel_children_are_tagged_with_their_key() {
    let collector = RunCollector::new();
    let config = RunnableConfig::new().with_handler(Arc::new(collector.clone()));
    let parallel = Parallel::new().step("left", Passthrough).step("right", Passthrough);

    parallel.invoke(json!(1), &config).await.unwrap();

    let root = collector.named("Parallel").await.remove(0);
    let children = collector.children_of(root.id).await;
    assert_eq!(children.len(), 2);
    assert!(children
        .iter()
        .any(|r| r.tags.contains(&"map:key:left".to_string())));
    assert!(children
        .iter()
        .any(|r| r.tags.contains(&"map:key:right".to_string())));
}

#[tokio::test]
async fn parallel_failure_cancels_siblings_and_returns_no_partial_map() {
    let collector = RunCollector::new();
    let config = RunnableConfig::new().with_handler(Arc::new(collector.clone()));
    let parallel = Parallel::new()
        .step("slow", sleepy(10_000, json!("late")).named("slow"))
        .step("fast", Lambda::new(|_| Err("fast failure".into())).named("fast"));

    let err = parallel.invoke(json!(null), &config).await.unwrap_err();
    assert_eq!(err.to_string(), "fast failure");

    assert_eq!(collector.named("slow").await[0].status, RunStatus::Cancelled);
    assert_eq!(collector.named("fast").await[0].status, RunStatus::Failed);
    assert_eq!(collector.named("Parallel").await[0].outputs, None);
}

#[tokio::test]
async fn parallel_respects_max_concurrency() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let tracked = {
        let active = active.clone();
        let peak = peak.clone();
        Lambda::from_async(move |x, _| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, BoxError>(x)
            }
        })
    }
    .boxed();

    let parallel = (0..6).fold(Parallel::new(), |p, i| p.step(format!("k{i}"), tracked.clone()));
    let config = RunnableConfig::new().with_max_concurrency(2);
    parallel.invoke(json!(1), &config).await.unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn each_maps_a_list_in_order() {
    let double = Lambda::new(|x| Ok(json!(x.as_i64().unwrap_or_default() * 2)));
    let out = double
        .map_each()
        .invoke(json!([1, 2, 3]), &RunnableConfig::new())
        .await
        .unwrap();
    assert_eq!(out, json!([2, 4, 6]));
}

#[tokio::test]
async fn each_streams_single_element_lists_in_order() {
    let each = Each::new(sleepy(5, json!("x")).boxed());
    let config = RunnableConfig::new();
    let chunks: Vec<_> = each
        .stream(json!([1, 2, 3]), &config)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(chunks, vec![json!(["x"]), json!(["x"]), json!(["x"])]);
}

#[tokio::test]
async fn each_rejects_non_list_input() {
    let err = Passthrough
        .map_each()
        .invoke(json!({"not": "a list"}), &RunnableConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Configuration(ConfigurationError::InvalidInput { .. })
    ));
}

#[tokio::test]
async fn later_step_replaces_same_key() {
    let parallel = Parallel::new()
        .step("a", Lambda::new(|_| Ok(json!(1))))
        .step("a", Lambda::new(|_| Ok(json!(2))));
    assert_eq!(parallel.keys().count(), 1);
    let out = parallel.invoke(json!(null), &RunnableConfig::new()).await.unwrap();
    assert_eq!(out, json!({"a": 2}));
}
