use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, SessionError};

/// A request on its way to the API
///
/// `retried` marks a request that has already been resubmitted once after a
/// 401, so it is never intercepted a second time.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub retried: bool,
}

impl OutgoingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set `Authorization: Bearer <token>`, replacing any previous value
    pub fn set_bearer(&mut self, token: &str) {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(value) => {
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!(path = %self.path, "Token is not a valid header value, sending without it");
            }
        }
    }

    /// Current bearer credential, if any
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A response as seen by the session layer
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub data: Value,
}

impl TransportResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self { status, data }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Best human-readable error text from the body
    pub fn error_message(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            data => data
                .get("error")
                .or_else(|| data.get("message"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
        }
    }
}

/// HTTP dispatch used by the session layer
///
/// Non-2xx statuses are responses, not errors. Only a request that never
/// produced a response is an `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutgoingRequest) -> Result<TransportResponse>;

    async fn post(&self, path: &str, body: Value, headers: HeaderMap) -> Result<TransportResponse> {
        let mut request = OutgoingRequest::post(path, body);
        request.headers = headers;
        self.send(&request).await
    }
}

/// Transport over a pooled reqwest client rooted at a base URL
pub struct ReqwestTransport {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Base URL every request path is joined to
    base_url: String,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new(
        base_url: &str,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &OutgoingRequest) -> Result<TransportResponse> {
        let url = self.url_for(&request.path);

        tracing::debug!(
            method = %request.method,
            url = %url,
            retried = request.retried,
            "Sending HTTP request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "HTTP request error");
            SessionError::from(e)
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(SessionError::from)?;
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        tracing::debug!(status, url = %url, "Received HTTP response");

        Ok(TransportResponse { status, data })
    }
}
