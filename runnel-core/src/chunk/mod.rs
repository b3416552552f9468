//! Merging of streamed chunks.
//!
//! Merging is associative with `null` as the identity, so folding the chunks
//! of a stream left to right reproduces the value `invoke` would return.

use serde_json::{Map, Number, Value};

use crate::error::MergeError;

/// Merges two chunks.
///
/// - strings and arrays concatenate
/// - objects merge key by key, recursing on shared keys
/// - numbers add
/// - booleans take the later value
/// - `null` on either side yields the other side
pub fn merge(left: Value, right: Value) -> Result<Value, MergeError> {
    match (left, right) {
        (Value::Null, r) => Ok(r),
        (l, Value::Null) => Ok(l),
        (Value::String(mut l), Value::String(r)) => {
            l.push_str(&r);
            Ok(Value::String(l))
        }
        (Value::Array(mut l), Value::Array(r)) => {
            l.extend(r);
            Ok(Value::Array(l))
        }
        (Value::Object(l), Value::Object(r)) => merge_objects(l, r).map(Value::Object),
        (Value::Number(l), Value::Number(r)) => add_numbers(&l, &r),
        (Value::Bool(_), Value::Bool(r)) => Ok(Value::Bool(r)),
        (l, r) => Err(MergeError {
            left: kind(&l),
            right: kind(&r),
        }),
    }
}

/// Folds every chunk with [`merge`]. An empty input yields `null`.
pub fn merge_all<I>(chunks: I) -> Result<Value, MergeError>
where
    I: IntoIterator<Item = Value>,
{
    chunks.into_iter().try_fold(Value::Null, merge)
}

fn merge_objects(
    mut left: Map<String, Value>,
    right: Map<String, Value>,
) -> Result<Map<String, Value>, MergeError> {
    for (key, value) in right {
        let merged = match left.remove(&key) {
            Some(existing) => merge(existing, value)?,
            None => value,
        };
        left.insert(key, merged);
    }
    Ok(left)
}

fn add_numbers(l: &Number, r: &Number) -> Result<Value, MergeError> {
    if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }
    if let (Some(a), Some(b)) = (l.as_u64(), r.as_u64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }
    let sum = l.as_f64().unwrap_or_default() + r.as_f64().unwrap_or_default();
    Number::from_f64(sum).map(Value::Number).ok_or(MergeError {
        left: "number",
        right: "number",
    })
}

pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Running merge of a chunk stream.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    merged: Value,
    chunks: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &Value) -> Result<(), MergeError> {
        let current = std::mem::take(&mut self.merged);
        self.merged = merge(current, chunk.clone())?;
        self.chunks += 1;
        Ok(())
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn current(&self) -> &Value {
        &self.merged
    }

    pub fn finish(self) -> Value {
        self.merged
    }
}
