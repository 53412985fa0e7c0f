//! Cache identity: an endpoint plus its normalized argument.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies one cache entry.
///
/// Two keys are equal when they name the same endpoint and their arguments
/// serialize to the same normalized JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  endpoint: &'static str,
  arg: String,
}

impl CacheKey {
  pub fn new<A: Serialize + ?Sized>(endpoint: &'static str, arg: &A) -> serde_json::Result<Self> {
    let value = serde_json::to_value(arg)?;
    Ok(Self {
      endpoint,
      arg: normalize(value).to_string(),
    })
  }

  pub fn endpoint(&self) -> &'static str {
    self.endpoint
  }

  /// Normalized argument as compact JSON.
  pub fn arg(&self) -> &str {
    &self.arg
  }

  /// Short, stable digest of the key for log lines.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.endpoint.as_bytes());
    hasher.update(b":");
    hasher.update(self.arg.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({})", self.endpoint, self.arg)
  }
}

/// Drop null object fields.
///
/// Object keys come out sorted because `serde_json::Map` is ordered. String
/// values are kept verbatim; request builders do their own trimming.
fn normalize(value: Value) -> Value {
  match value {
    Value::Object(map) => Value::Object(
      map
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k, normalize(v)))
        .collect(),
    ),
    Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
    other => other,
  }
}
