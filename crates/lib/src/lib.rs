//! docrelay core library: Messenger webhook gateway, document-QA and LLM clients,
//! and the per-event reply pipeline used by the CLI.

pub mod channels;
pub mod compose;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod keepalive;
pub mod llm;
pub mod outbound;
pub mod qa;
pub mod storage;
