//! OpenAI-compatible chat completion client (OpenRouter by default).
//!
//! Single-turn only: one user message in, the first choice's content out.

use crate::llm::Completion;
use crate::outbound::{ApiClient, RelayError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Returned when the endpoint answers with an empty `choices` list or an empty message.
pub const FALLBACK_REPLY: &str = "I can not help you right now.";

/// Client for `POST <base>/chat/completions`.
#[derive(Clone)]
pub struct CompletionClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    referer: Option<String>,
    title: Option<String>,
    api: ApiClient,
}

impl CompletionClient {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str, api: ApiClient) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            referer: None,
            title: None,
            api,
        }
    }

    /// Attribution headers (`HTTP-Referer`, `X-Title`) that OpenRouter uses for app rankings.
    pub fn with_attribution(mut self, referer: Option<String>, title: Option<String>) -> Self {
        self.referer = referer;
        self.title = title;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Authorization", format!("Bearer {}", api_key))];
        if let Some(ref r) = self.referer {
            headers.push(("HTTP-Referer", r.clone()));
        }
        if let Some(ref t) = self.title {
            headers.push(("X-Title", t.clone()));
        }
        headers
    }
}

#[async_trait]
impl Completion for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, RelayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(RelayError::NotConfigured("llm api key"))?;
        let body = OpenAiChatRequest {
            model: self.model.clone(),
            messages: vec![OpenAiMessage::User {
                content: prompt.to_string(),
            }],
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| RelayError::MalformedResponse(format!("encoding request: {}", e)))?;
        let data = self
            .api
            .post_json(&self.completions_url(), &self.headers(api_key), &body)
            .await?;
        log::debug!("completion response: {}", data);
        extract_reply(data)
    }
}

/// First choice's message content. Missing `choices` is malformed; an empty list or empty content yields [`FALLBACK_REPLY`].
pub fn extract_reply(data: serde_json::Value) -> Result<String, RelayError> {
    let parsed: OpenAiChatResponse = serde_json::from_value(data)
        .map_err(|e| RelayError::MalformedResponse(format!("completion body: {}", e)))?;
    let choices = parsed
        .choices
        .ok_or_else(|| RelayError::MalformedResponse("missing choices".to_string()))?;
    let content = choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty());
    Ok(content.unwrap_or_else(|| FALLBACK_REPLY.to_string()))
}

// --- OpenAI wire types ---

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
enum OpenAiMessage {
    User { content: String },
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
