use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use runnel_core::{json, BoxError, ConfigurationError, RunError, RunStatus, RunnableConfig};
use runnel_exec::{BatchOptions, Lambda, RunCollector, Runnable};

fn reject_odd() -> Lambda {
    Lambda::new(|x| match x.as_i64() {
        Some(n) if n % 2 == 1 => Err(format!("{n} is odd").into()),
        Some(n) => Ok(json!(n * 10)),
        None => Err("not a number".into()),
    })
}

#[tokio::test]
async fn batch_keeps_results_aligned_with_inputs() {
    // Later items finish first.
    let staggered = Lambda::from_async(|x, _| async move {
        let n = x.as_u64().unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(40 - n * 10)).await;
        Ok::<_, BoxError>(json!(n * n))
    });

    let out = staggered
        .batch(vec![json!(1), json!(2), json!(3)], &RunnableConfig::new())
        .await
        .unwrap();
    assert_eq!(out, vec![json!(1), json!(4), json!(9)]);
}

#[tokio::test]
async fn batch_of_nothing_is_empty() {
    let out = reject_odd().batch(Vec::new(), &RunnableConfig::new()).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn batch_fails_on_first_error() {
    let err = reject_odd()
        .batch(vec![json!(2), json!(3), json!(4)], &RunnableConfig::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "3 is odd");
}

#[tokio::test]
async fn return_exceptions_reports_each_item() {
    let out = reject_odd()
        .batch_with_options(
            vec![json!(2), json!(3), json!(4)],
            &RunnableConfig::new(),
            BatchOptions::default().return_exceptions(),
        )
        .await
        .unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(out[0].as_ref().unwrap(), &json!(20));
    assert_eq!(out[1].as_ref().unwrap_err().to_string(), "3 is odd");
    assert_eq!(out[2].as_ref().unwrap(), &json!(40));
}

#[tokio::test]
async fn each_item_is_its_own_root_run() {
    let collector = RunCollector::new();
    let config = RunnableConfig::new().with_handler(Arc::new(collector.clone()));

    reject_odd()
        .batch_with_options(
            vec![json!(2), json!(3)],
            &config,
            BatchOptions::default().return_exceptions(),
        )
        .await
        .unwrap();

    let roots = collector.roots().await;
    assert_eq!(roots.len(), 2);
    assert_eq!(collector.with_status(RunStatus::Succeeded).await.len(), 1);
    assert_eq!(collector.with_status(RunStatus::Failed).await.len(), 1);
}

#[tokio::test]
async fn per_item_configs_must_match_inputs() {
    let err = reject_odd()
        .batch_with_configs(
            vec![json!(1), json!(2)],
            vec![RunnableConfig::new()],
            BatchOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::Configuration(ConfigurationError::BatchConfigMismatch {
            inputs: 2,
            configs: 1
        })
    ));
}

#[tokio::test]
async fn per_item_configs_name_each_run() {
    let collector = RunCollector::new();
    let base = RunnableConfig::new().with_handler(Arc::new(collector.clone()));
    let configs = vec![
        base.clone().with_run_name("first"),
        base.clone().with_run_name("second"),
    ];

    reject_odd()
        .batch_with_configs(vec![json!(2), json!(4)], configs, BatchOptions::default())
        .await
        .unwrap();

    assert_eq!(collector.named("first").await[0].inputs, json!(2));
    assert_eq!(collector.named("second").await[0].inputs, json!(4));
}

#[tokio::test]
async fn batch_options_cap_concurrency() {
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
                tokio::time::sleep(Duration::from_millis(15)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, BoxError>(x)
            }
        })
    };

    let inputs = (0..8).map(|i| json!(i)).collect();
    tracked
        .batch_with_options(
            inputs,
            &RunnableConfig::new(),
            BatchOptions::default().with_max_concurrency(3),
        )
        .await
        .unwrap();
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn as_completed_yields_every_index_once() {
    let staggered = Lambda::from_async(|x, _| async move {
        let n = x.as_u64().unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(60 - n * 25)).await;
        Ok::<_, BoxError>(x)
    });

    let config = RunnableConfig::new();
    let finished: Vec<_> = staggered
        .batch_as_completed(vec![json!(0), json!(1), json!(2)], &config)
        .collect()
        .await;

    let order: Vec<usize> = finished.iter().map(|(index, _)| *index).collect();
    assert_eq!(order, vec![2, 1, 0]);
    let indices: HashSet<usize> = order.into_iter().collect();
    assert_eq!(indices.len(), 3);
    for (index, result) in finished {
        assert_eq!(result.unwrap(), json!(index));
    }
}
