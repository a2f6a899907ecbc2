//! Messenger channel: inbound webhook events and the Send API.
//!
//! Webhook payloads are flattened into tagged [`InboundEvent`]s at the boundary; replies
//! leave through a [`ReplySender`] so the dispatcher can be driven without the network.

mod inbound;
mod messenger;
mod reply;

pub use inbound::{flatten_events, InboundEvent, MessagingEvent, PAGE_OBJECT};
pub use messenger::MessengerClient;
pub use reply::{OutboundReply, Recipient, ReplyMessage, ReplySender, SendReceipt};
