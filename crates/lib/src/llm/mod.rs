//! LLM completion abstraction and the OpenAI-compatible client.
//!
//! Used to rewrite document-QA answers before they are sent to the user.

mod openai_compat;

use crate::outbound::RelayError;
use async_trait::async_trait;

pub use openai_compat::{extract_reply, CompletionClient, FALLBACK_REPLY};

/// Single-prompt text completion.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, RelayError>;
}
