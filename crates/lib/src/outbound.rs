//! Generic JSON-over-HTTP call wrapper shared by the QA, LLM, and Send API clients.
//!
//! One request, one parsed JSON body. No retries; callers inspect domain error fields.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Failure of a call to an upstream dependency.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request never completed (DNS, refused connection, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Upstream answered with a non-2xx status.
    #[error("upstream returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },
    /// Upstream answered 2xx but the body carries a domain error field.
    #[error("upstream error: {0}")]
    UpstreamLogical(String),
    /// Expected fields are missing or the body is not JSON.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// A required secret or endpoint is not configured.
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    /// A configured endpoint does not form a valid URL.
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),
}

/// Thin wrapper around a `reqwest::Client` with an explicit per-call timeout.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Send `body` (if any) as JSON and parse the response body as JSON.
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, RelayError> {
        let mut req = self.client.request(method, url).timeout(self.timeout);
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| {
            RelayError::MalformedResponse(format!("body is not JSON ({}): {}", e, snippet(&text)))
        })
    }

    /// POST a JSON body.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, RelayError> {
        self.call(Method::POST, url, headers, Some(body)).await
    }

    /// GET a URL, discarding the body. Used by the keep-alive pinger, which only cares about reachability.
    pub async fn ping(&self, url: &str) -> Result<StatusCode, RelayError> {
        let res = self.client.get(url).timeout(self.timeout).send().await?;
        Ok(res.status())
    }
}

/// Build an `UpstreamStatus` error, preferring the upstream's own error message when the body is JSON.
fn status_error(status: StatusCode, body: &str) -> RelayError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| error_message(&v))
        .unwrap_or_else(|| snippet(body));
    RelayError::UpstreamStatus {
        status: status.as_u16(),
        message,
    }
}

/// Extract a domain error from a JSON body: `{"error": "..."}` or `{"error": {"message": "..."}}`.
pub fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => Some(
            o.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(o.clone()).to_string()),
        ),
        other => Some(other.to_string()),
    }
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    let t = text.trim();
    if t.chars().count() <= MAX {
        t.to_string()
    } else {
        let cut: String = t.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}
