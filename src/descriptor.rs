//! Static query and mutation declarations.
//!
//! Every resource client declares its endpoints once as `const` descriptors.
//! They are never mutated at runtime.

use serde::Serialize;

use crate::cache::{CacheKey, Tag};
use crate::transport::{ApiRequest, Method};

/// Path, query parameters and body produced from a call argument.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestTarget {
  pub path: String,
  pub params: Vec<(String, String)>,
  pub body: Option<serde_json::Value>,
}

impl RequestTarget {
  pub fn path(path: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      ..Self::default()
    }
  }

  pub fn param(mut self, name: &str, value: impl ToString) -> Self {
    self.params.push((name.to_string(), value.to_string()));
    self
  }

  pub fn param_opt(self, name: &str, value: Option<impl ToString>) -> Self {
    match value {
      Some(v) => self.param(name, v),
      None => self,
    }
  }

  pub fn body(mut self, body: serde_json::Value) -> Self {
    self.body = Some(body);
    self
  }
}

/// A read endpoint and the tags its results provide.
pub struct QueryDescriptor<A: ?Sized> {
  pub endpoint: &'static str,
  pub method: Method,
  pub build_request: fn(&A) -> RequestTarget,
  pub provides: &'static [Tag],
}

impl<A: Serialize + ?Sized> QueryDescriptor<A> {
  pub fn key(&self, arg: &A) -> serde_json::Result<CacheKey> {
    CacheKey::new(self.endpoint, arg)
  }

  pub fn request(&self, arg: &A) -> ApiRequest {
    to_request(self.method, (self.build_request)(arg))
  }
}

/// A write endpoint and the tags it invalidates on success.
pub struct MutationDescriptor<A: ?Sized> {
  pub endpoint: &'static str,
  pub method: Method,
  pub build_request: fn(&A) -> RequestTarget,
  pub invalidates: &'static [Tag],
}

impl<A: ?Sized> MutationDescriptor<A> {
  pub fn request(&self, arg: &A) -> ApiRequest {
    to_request(self.method, (self.build_request)(arg))
  }
}

fn to_request(method: Method, target: RequestTarget) -> ApiRequest {
  ApiRequest {
    method,
    path: target.path,
    params: target.params,
    body: target.body,
  }
}
