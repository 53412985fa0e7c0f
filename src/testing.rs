//! Scripted transport for unit tests.

use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::FetchError;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// Reply produced by a `MockTransport` handler.
pub(crate) struct MockReply {
  result: Result<ApiResponse, FetchError>,
  delay: Duration,
}

impl MockReply {
  pub fn ok(data: Value) -> Self {
    Self {
      result: Ok(ApiResponse { status: 200, data }),
      delay: Duration::ZERO,
    }
  }

  pub fn server(status: u16, body: Value) -> Self {
    Self {
      result: Err(FetchError::server(status, body)),
      delay: Duration::ZERO,
    }
  }

  pub fn network(message: &str) -> Self {
    Self {
      result: Err(FetchError::network(message)),
      delay: Duration::ZERO,
    }
  }

  pub fn after(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }
}

type Handler = Box<dyn Fn(&ApiRequest) -> MockReply + Send + Sync>;

/// Transport that answers from a closure and records every request.
pub(crate) struct MockTransport {
  handler: Handler,
  calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
  pub fn new(handler: impl Fn(&ApiRequest) -> MockReply + Send + Sync + 'static) -> Arc<Self> {
    Arc::new(Self {
      handler: Box::new(handler),
      calls: Mutex::new(Vec::new()),
    })
  }

  pub fn calls(&self) -> Vec<ApiRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self, method: Method, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.method == method && r.path == path)
      .count()
  }
}

impl Transport for MockTransport {
  fn request(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, FetchError>> {
    self.calls.lock().unwrap().push(request.clone());
    let reply = (self.handler)(&request);
    Box::pin(async move {
      if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
      }
      reply.result
    })
  }
}
