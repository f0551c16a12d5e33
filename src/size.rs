//! Document size estimation.
//! Estimators are plain functions injected into buffers so the accounting can
//! model the target provider's wire encoding.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::config::Provider;

/// Deterministic `(document) -> bytes` function. Errors propagate to the caller unchanged.
pub type SizeEstimator<D> = Arc<dyn Fn(&D) -> Result<usize> + Send + Sync>;

/// Wrap a closure as a [`SizeEstimator`].
pub fn estimator<D, F>(f: F) -> SizeEstimator<D>
where
    F: Fn(&D) -> Result<usize> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Default estimator for a provider: BSON for MongoDB, JSON for Cosmos DB.
pub fn estimator_for(provider: Provider) -> SizeEstimator<Value> {
    match provider {
        Provider::MongoDb => estimator(bson_size),
        Provider::CosmosDb => estimator(json_size),
    }
}

// ============================================================================
// JSON
// ============================================================================

/// Length of the compact JSON serialization. `null` counts as no document.
pub fn json_size(doc: &Value) -> Result<usize> {
    if doc.is_null() {
        return Ok(0);
    }
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, doc).context("serializing document for size estimate")?;
    Ok(counter.0)
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// BSON
// ============================================================================

// int32 length prefix + trailing NUL
const BSON_DOC_OVERHEAD: usize = 5;
const BSON_TYPE_TAG: usize = 1;

/// Encoded BSON length of a JSON object. `null` counts as no document.
/// Anything other than an object cannot be a top-level BSON document and is an error.
pub fn bson_size(doc: &Value) -> Result<usize> {
    match doc {
        Value::Null => Ok(0),
        Value::Object(map) => bson_object_size(map),
        other => anyhow::bail!(
            "top-level document must be a JSON object, got {}",
            json_kind(other)
        ),
    }
}

fn bson_object_size(map: &Map<String, Value>) -> Result<usize> {
    let mut size = BSON_DOC_OVERHEAD;
    for (key, value) in map {
        size += bson_element_size(key, value)?;
    }
    Ok(size)
}

fn bson_array_size(items: &[Value]) -> Result<usize> {
    let mut size = BSON_DOC_OVERHEAD;
    for (idx, value) in items.iter().enumerate() {
        // Array keys are the decimal indices "0", "1", ...
        size += BSON_TYPE_TAG + decimal_len(idx) + 1 + bson_value_size(value)?;
    }
    Ok(size)
}

fn bson_element_size(key: &str, value: &Value) -> Result<usize> {
    if key.contains('\0') {
        anyhow::bail!("field name {key:?} contains a NUL byte");
    }
    Ok(BSON_TYPE_TAG + key.len() + 1 + bson_value_size(value)?)
}

fn bson_value_size(value: &Value) -> Result<usize> {
    let size = match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => 4,
            // int64 and double are both 8 bytes; u64 beyond i64 is stored as double
            _ => 8,
        },
        // int32 length + bytes + NUL
        Value::String(s) => 4 + s.len() + 1,
        Value::Array(items) => bson_array_size(items)?,
        Value::Object(map) => bson_object_size(map)?,
    };
    Ok(size)
}

fn decimal_len(mut n: usize) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
