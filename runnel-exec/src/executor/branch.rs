use async_trait::async_trait;
use futures_util::StreamExt;
use runnel_core::{BoxError, RunError, Value};

use crate::runnable::{ChunkStream, DynRunnable, Lambda, RunScope, Runnable, RunnableExt};

/// Routes the input to the first branch whose condition holds, or to the
/// default. Conditions are runnables themselves and run as child runs.
#[derive(Clone)]
pub struct Branch {
    branches: Vec<(DynRunnable, DynRunnable)>,
    default: DynRunnable,
}

impl Branch {
    pub fn new<R: Runnable + 'static>(default: R) -> Self {
        Self {
            branches: Vec::new(),
            default: default.boxed(),
        }
    }

    pub fn branch<C, R>(mut self, condition: C, runnable: R) -> Self
    where
        C: Runnable + 'static,
        R: Runnable + 'static,
    {
        self.branches.push((condition.boxed(), runnable.boxed()));
        self
    }

    /// Shorthand for a branch guarded by a plain predicate.
    pub fn when<P, R>(self, predicate: P, runnable: R) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        R: Runnable + 'static,
    {
        let condition =
            Lambda::new(move |input| Ok::<_, BoxError>(Value::Bool(predicate(&input))))
                .named("condition");
        self.branch(condition, runnable)
    }

    /// Picks the runnable to run and the tag to run it under.
    async fn select(
        &self,
        input: &Value,
        scope: &RunScope,
    ) -> Result<(&DynRunnable, String), RunError> {
        for (index, (condition, runnable)) in self.branches.iter().enumerate() {
            let tag = format!("condition:{}", index + 1);
            let verdict = condition
                .invoke(input.clone(), &scope.child_config(Some(tag)))
                .await?;
            if is_truthy(&verdict) {
                return Ok((runnable, format!("branch:{}", index + 1)));
            }
        }
        Ok((&self.default, "branch:default".to_string()))
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[async_trait]
impl Runnable for Branch {
    fn name(&self) -> String {
        "Branch".to_string()
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let (runnable, tag) = self.select(&input, scope).await?;
        runnable.invoke(input, &scope.child_config(Some(tag))).await
    }

    fn execute_stream<'a>(&'a self, input: Value, scope: &'a RunScope) -> ChunkStream<'a> {
        Box::pin(async_stream::stream! {
            let (runnable, tag) = match self.select(&input, scope).await {
                Ok(selected) => selected,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            let config = scope.child_config(Some(tag));
            let mut chunks = runnable.stream(input, &config);
            while let Some(chunk) = chunks.next().await {
                yield chunk;
            }
        })
    }
}
