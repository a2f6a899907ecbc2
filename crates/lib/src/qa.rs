//! Document-QA client: `POST <base>/query {"query": ...}` → `{"result"?, "error"?}`.

use crate::outbound::{error_message, ApiClient, RelayError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Answer from the document-QA service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResult {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Answers a free-text query against a fixed document corpus.
#[async_trait]
pub trait DocumentQa: Send + Sync {
    /// Returns the service's answer. A response carrying an `error` field is an `UpstreamLogical` failure.
    async fn query(&self, text: &str) -> Result<QaResult, RelayError>;
}

/// HTTP client for the document-QA service.
#[derive(Clone)]
pub struct QaClient {
    base_url: String,
    api: ApiClient,
}

impl QaClient {
    pub fn new(base_url: &str, api: ApiClient) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api,
        }
    }

    pub fn query_url(&self) -> String {
        format!("{}/query", self.base_url)
    }
}

#[async_trait]
impl DocumentQa for QaClient {
    async fn query(&self, text: &str) -> Result<QaResult, RelayError> {
        let body = json!({ "query": text });
        let data = self.api.post_json(&self.query_url(), &[], &body).await?;
        log::debug!("qa response: {}", data);
        if let Some(err) = error_message(&data) {
            return Err(RelayError::UpstreamLogical(err));
        }
        // A non-string result is tolerated as absent rather than failing the event.
        Ok(QaResult {
            result: data
                .get("result")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            error: None,
        })
    }
}
