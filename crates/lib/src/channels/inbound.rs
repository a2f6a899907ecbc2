//! Inbound Messenger events: webhook payload shape and flattening into tagged events.

use serde::Deserialize;
use serde_json::Value;

/// `object` value Messenger uses for page subscriptions.
pub const PAGE_OBJECT: &str = "page";

/// One event from the webhook, validated at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A text message from a user.
    Message { sender_id: String, text: String },
    /// A postback (button tap). Not answered.
    Postback { sender_id: String, payload: Value },
    /// Anything else: attachments, echoes, read receipts, or shapes we could not parse.
    Unknown {
        sender_id: Option<String>,
        reason: &'static str,
    },
}

impl InboundEvent {
    pub fn sender_id(&self) -> Option<&str> {
        match self {
            InboundEvent::Message { sender_id, .. } | InboundEvent::Postback { sender_id, .. } => {
                Some(sender_id.as_str())
            }
            InboundEvent::Unknown { sender_id, .. } => sender_id.as_deref(),
        }
    }

    /// Short tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Message { .. } => "message",
            InboundEvent::Postback { .. } => "postback",
            InboundEvent::Unknown { .. } => "unknown",
        }
    }
}

/// Raw `entry[].messaging[]` item as Messenger sends it.
#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: Option<Participant>,
    #[serde(default)]
    pub message: Option<MessengerMessage>,
    #[serde(default)]
    pub postback: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessengerMessage {
    #[serde(default)]
    pub text: Option<String>,
    /// Set on copies of messages the page itself sent (echo subscription).
    #[serde(default)]
    pub is_echo: Option<bool>,
}

impl From<MessagingEvent> for InboundEvent {
    fn from(ev: MessagingEvent) -> Self {
        let Some(sender_id) = ev.sender.map(|s| s.id) else {
            return InboundEvent::Unknown {
                sender_id: None,
                reason: "missing sender",
            };
        };
        if let Some(msg) = ev.message {
            if msg.is_echo == Some(true) {
                return InboundEvent::Unknown {
                    sender_id: Some(sender_id),
                    reason: "echo",
                };
            }
            return match msg.text {
                Some(text) => InboundEvent::Message { sender_id, text },
                None => InboundEvent::Unknown {
                    sender_id: Some(sender_id),
                    reason: "message without text",
                },
            };
        }
        if let Some(payload) = ev.postback {
            return InboundEvent::Postback { sender_id, payload };
        }
        InboundEvent::Unknown {
            sender_id: Some(sender_id),
            reason: "no message or postback",
        }
    }
}

/// Flatten `entry[].messaging[]` into events. Missing or non-array fields count as empty;
/// an item that does not parse becomes `Unknown` instead of failing the batch.
pub fn flatten_events(payload: &Value) -> Vec<InboundEvent> {
    let entries = payload
        .get("entry")
        .and_then(|e| e.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    entries
        .iter()
        .flat_map(|entry| {
            entry
                .get("messaging")
                .and_then(|m| m.as_array())
                .map(Vec::as_slice)
                .unwrap_or(&[])
        })
        .map(|raw| match MessagingEvent::deserialize(raw) {
            Ok(ev) => InboundEvent::from(ev),
            Err(e) => {
                log::debug!("unparseable messaging event: {}", e);
                InboundEvent::Unknown {
                    sender_id: None,
                    reason: "unparseable event",
                }
            }
        })
        .collect()
}
