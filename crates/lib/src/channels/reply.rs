//! Outbound reply types and the sender seam.

use crate::outbound::RelayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Send API request body: `{"recipient": {"id"}, "message": {"text"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub recipient: Recipient,
    pub message: ReplyMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub text: String,
}

impl OutboundReply {
    pub fn text(recipient_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient: Recipient {
                id: recipient_id.into(),
            },
            message: ReplyMessage { text: text.into() },
        }
    }
}

/// Successful Send API response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

/// Delivers a reply to the end user.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Consumes the reply; callers build one per event.
    async fn send(&self, reply: OutboundReply) -> Result<SendReceipt, RelayError>;
}
