//! The HTTP collaborator the cache fetches through.

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::error::FetchError;
use color_eyre::{eyre::eyre, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    };
    f.write_str(name)
  }
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// One request against the backend, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  pub params: Vec<(String, String)>,
  pub body: Option<Value>,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      params: Vec::new(),
      body: None,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::Get, path)
  }

  pub fn param(mut self, name: &str, value: impl ToString) -> Self {
    self.params.push((name.to_string(), value.to_string()));
    self
  }

  pub fn body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }
}

impl fmt::Display for ApiRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.path)
  }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
  pub status: u16,
  pub data: Value,
}

/// Executes requests. Non-2xx responses resolve to `FetchError::Server`,
/// transport failures to `FetchError::Network`.
pub trait Transport: Send + Sync {
  fn request(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, FetchError>>;
}

/// reqwest-backed transport for the catalog REST API.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpTransport {
  pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
    let mut base = config.base_url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      token,
    })
  }

  /// Build a transport from the application config, reading the token
  /// from the environment.
  pub fn from_config(config: &Config) -> Result<Self> {
    Self::new(&config.api, Config::get_api_token())
  }

  fn url_for(&self, request: &ApiRequest) -> std::result::Result<Url, FetchError> {
    let mut url = self
      .base_url
      .join(request.path.trim_start_matches('/'))
      .map_err(|e| FetchError::network(format!("invalid path {}: {}", request.path, e)))?;
    if !request.params.is_empty() {
      url.query_pairs_mut().extend_pairs(&request.params);
    }
    Ok(url)
  }

  async fn send(&self, request: ApiRequest) -> std::result::Result<ApiResponse, FetchError> {
    let url = self.url_for(&request)?;
    debug!(method = %request.method, url = %url, "sending request");

    let mut builder = self.client.request(request.method.into(), url);
    if let Some(token) = &self.token {
      builder = builder.header(reqwest::header::AUTHORIZATION, token);
    }
    if let Some(body) = &request.body {
      let encoded = serde_json::to_vec(body)
        .map_err(|e| FetchError::network(format!("failed to encode body: {}", e)))?;
      builder = builder
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(encoded);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| FetchError::network(e.to_string()))?;
    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| FetchError::network(e.to_string()))?;
    let data = parse_body(&text);

    if status.is_success() {
      Ok(ApiResponse {
        status: status.as_u16(),
        data,
      })
    } else {
      Err(FetchError::server(status.as_u16(), data))
    }
  }
}

impl Transport for HttpTransport {
  fn request(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, FetchError>> {
    Box::pin(self.send(request))
  }
}

/// JSON when possible, the raw text otherwise, null for an empty body.
fn parse_body(text: &str) -> Value {
  if text.trim().is_empty() {
    return Value::Null;
  }
  serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
