use async_trait::async_trait;
use runnel_core::{ConfigurationError, RunError, Value};
use serde_json::Map;

use crate::executor::Parallel;
use crate::runnable::{RunScope, Runnable};

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Runnable for Passthrough {
    fn name(&self) -> String {
        "Passthrough".to_string()
    }

    async fn execute(&self, input: Value, _scope: &RunScope) -> Result<Value, RunError> {
        Ok(input)
    }
}

/// Runs a parallel map over an object input and adds its keys to that input.
pub struct Assign {
    mapper: Parallel,
}

impl Assign {
    pub fn new(mapper: Parallel) -> Self {
        Self { mapper }
    }
}

#[async_trait]
impl Runnable for Assign {
    fn name(&self) -> String {
        "Assign".to_string()
    }

    fn preemptible(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, scope: &RunScope) -> Result<Value, RunError> {
        let Value::Object(mut base) = input else {
            return Err(invalid_input("Assign", &input));
        };
        let assigned = self
            .mapper
            .invoke(Value::Object(base.clone()), scope.config())
            .await?;
        if let Value::Object(extra) = assigned {
            base.extend(extra);
        }
        Ok(Value::Object(base))
    }
}

/// Selects keys from an object input.
///
/// A single key yields that key's value (or `null`); several keys yield an
/// object holding just the keys that are present.
#[derive(Debug, Clone)]
pub struct Pick {
    keys: Vec<String>,
}

impl Pick {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            keys: vec![key.into()],
        }
    }

    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Runnable for Pick {
    fn name(&self) -> String {
        "Pick".to_string()
    }

    async fn execute(&self, input: Value, _scope: &RunScope) -> Result<Value, RunError> {
        let Value::Object(mut map) = input else {
            return Err(invalid_input("Pick", &input));
        };
        if let [key] = self.keys.as_slice() {
            return Ok(map.remove(key).unwrap_or(Value::Null));
        }
        let picked: Map<String, Value> = self
            .keys
            .iter()
            .filter_map(|key| map.remove(key).map(|value| (key.clone(), value)))
            .collect();
        Ok(Value::Object(picked))
    }
}

fn invalid_input(runnable: &str, input: &Value) -> RunError {
    RunError::from(ConfigurationError::InvalidInput {
        runnable: runnable.to_string(),
        message: format!("expected an object, got {}", runnel_core::chunk::kind(input)),
    })
}
