//! Backend API Client
//!
//! The backend is the service of record for orders, appointments, leads and
//! bookings. This module only knows how to deliver one request and classify
//! the outcome; it never retries.

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Longest backend error body kept in an error value.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single outbound call to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub method: HttpMethod,
    /// Path segments below the base URL, unescaped.
    pub segments: Vec<String>,
    pub body: Option<Value>,
    /// Sent as the `Idempotency-Key` header when present.
    pub idempotency_key: Option<String>,
}

impl BackendRequest {
    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: HttpMethod::Get,
            segments: segments.into_iter().map(Into::into).collect(),
            body: None,
            idempotency_key: None,
        }
    }

    pub fn post<I, S>(segments: I, body: Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: HttpMethod::Post,
            segments: segments.into_iter().map(Into::into).collect(),
            body: Some(body),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// The request path as it appears in logs, e.g. `/orders/42/finish`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// Why a backend call did not produce a usable response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendCallError {
    #[error("Backend call timed out")]
    Timeout,
    #[error("Could not reach backend: {0}")]
    Connection(String),
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Backend response could not be decoded: {0}")]
    Decode(String),
    #[error("Backend request could not be built: {0}")]
    Request(String),
}

impl BackendCallError {
    /// Short machine-readable cause handed to the model.
    pub fn cause(&self) -> &'static str {
        match self {
            BackendCallError::Timeout => "timeout",
            BackendCallError::Connection(_) => "connection",
            BackendCallError::Status { .. } => "status",
            BackendCallError::Decode(_) => "decode",
            BackendCallError::Request(_) => "request",
        }
    }

    /// Whether the backend may have applied a mutation we did not hear back about.
    pub fn outcome_unknown(&self, mutating: bool) -> bool {
        mutating
            && match self {
                BackendCallError::Timeout => true,
                BackendCallError::Status { status, .. } => *status >= 500,
                _ => false,
            }
    }

    /// Whether re-issuing the same call is safe.
    pub fn is_retryable(&self, mutating: bool) -> bool {
        match self {
            BackendCallError::Connection(_) => true,
            BackendCallError::Status { status: 429, .. } => true,
            BackendCallError::Status { status, .. } if *status >= 500 => !mutating,
            BackendCallError::Timeout => !mutating,
            BackendCallError::Decode(_) => !mutating,
            BackendCallError::Status { .. } | BackendCallError::Request(_) => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendCallError::Timeout
        } else if err.is_connect() {
            BackendCallError::Connection(err.to_string())
        } else {
            BackendCallError::Request(err.to_string())
        }
    }
}

/// Delivers backend requests. One call to `send` is one HTTP exchange.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn send(&self, request: BackendRequest) -> Result<Value, BackendCallError>;
}

/// `BackendClient` over HTTP with a per-request timeout.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendCallError> {
        let base_url =
            Url::parse(base_url).map_err(|e| BackendCallError::Request(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendCallError::Request(format!(
                "'{}' cannot be used as a base URL",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendCallError::from_reqwest)?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, request: &BackendRequest) -> Result<Url, BackendCallError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendCallError::Request("base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(&request.segments);
        Ok(url)
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn send(&self, request: BackendRequest) -> Result<Value, BackendCallError> {
        let url = self.url_for(&request)?;
        debug!(method = ?request.method, %url, "Calling backend");

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await.map_err(BackendCallError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(BackendCallError::from_reqwest)?;

        if !status.is_success() {
            let mut body = text;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(BackendCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| BackendCallError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_joins_segments() {
        let request = BackendRequest::get(["orders", "client", "42"]);
        assert_eq!(request.path(), "/orders/client/42");
        assert_eq!(request.method, HttpMethod::Get);
        assert!(request.body.is_none());
    }

    #[test]
    fn test_url_escapes_segments_and_keeps_base_path() {
        let backend = HttpBackend::new("http://localhost:3001/api/", Duration::from_secs(1)).unwrap();
        let url = backend
            .url_for(&BackendRequest::get(["bookings", "AB 12/3"]))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/api/bookings/AB%2012%2F3");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(HttpBackend::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpBackend::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_causes() {
        assert_eq!(BackendCallError::Timeout.cause(), "timeout");
        assert_eq!(BackendCallError::Connection("refused".into()).cause(), "connection");
        let status = BackendCallError::Status { status: 500, body: String::new() };
        assert_eq!(status.cause(), "status");
    }

    #[test]
    fn test_retry_policy_depends_on_mutation() {
        let timeout = BackendCallError::Timeout;
        assert!(timeout.is_retryable(false));
        assert!(!timeout.is_retryable(true));
        assert!(timeout.outcome_unknown(true));
        assert!(!timeout.outcome_unknown(false));

        let refused = BackendCallError::Connection("refused".into());
        assert!(refused.is_retryable(true));
        assert!(!refused.outcome_unknown(true));

        let not_found = BackendCallError::Status { status: 404, body: String::new() };
        assert!(!not_found.is_retryable(false));
        assert!(!not_found.outcome_unknown(true));

        let throttled = BackendCallError::Status { status: 429, body: String::new() };
        assert!(throttled.is_retryable(true));
    }
}
