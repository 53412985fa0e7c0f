//! Error types shared by the cache, query and mutation layers.

use serde_json::Value;
use thiserror::Error;

use crate::cache::CacheKey;

/// Failure of a single request against the REST backend.
///
/// Errors are stored inside cache entries and handed to every subscriber,
/// so this type stays `Clone` and carries no transport handles.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
  /// Transport failure, no response was received
  #[error("network error: {message}")]
  Network { message: String },
  /// Non-2xx response with a structured body
  #[error("server responded with status {status}")]
  Server { status: u16, body: Value },
}

impl FetchError {
  pub fn network(message: impl Into<String>) -> Self {
    Self::Network {
      message: message.into(),
    }
  }

  pub fn server(status: u16, body: Value) -> Self {
    Self::Server { status, body }
  }

  /// HTTP status of a server error.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Server { status, .. } => Some(*status),
      Self::Network { .. } => None,
    }
  }

  /// The `message` field the backend puts in its error bodies, if any.
  pub fn server_message(&self) -> Option<&str> {
    match self {
      Self::Server { body, .. } => body.get("message").and_then(Value::as_str),
      Self::Network { .. } => None,
    }
  }
}

/// Errors surfaced by the synchronization layer itself.
#[derive(Debug, Error)]
pub enum SyncError {
  #[error(transparent)]
  Fetch(#[from] FetchError),
  /// Read of a key that was never registered. Always a caller bug.
  #[error("no cache entry for {0}")]
  CacheMiss(CacheKey),
  #[error("invalid state: {0}")]
  InvalidState(&'static str),
  /// Argument could not be encoded, or a payload did not match its type
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Report a cache miss: fatal in debug builds, logged and ignored in release.
pub(crate) fn report_cache_miss(key: &CacheKey) {
  tracing::error!(key = %key, "read of unregistered cache key");
  debug_assert!(false, "read of unregistered cache key {key}");
}
