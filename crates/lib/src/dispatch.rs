//! Per-event reply pipeline: document-QA, optional LLM rewrite, Send API.
//!
//! Each event runs on its own; failures end that event's pipeline and are logged, never
//! propagated. A batch is joined as a whole so the webhook ack waits for every event.

use crate::channels::{InboundEvent, OutboundReply, ReplySender, SendReceipt};
use crate::compose::compose_rewrite_prompt;
use crate::llm::Completion;
use crate::outbound::RelayError;
use crate::qa::DocumentQa;
use futures_util::future::join_all;
use std::fmt;
use std::sync::Arc;

/// Pipeline step where an event failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Qa,
    Rewrite,
    Send,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Qa => "qa",
            Stage::Rewrite => "rewrite",
            Stage::Send => "send",
        })
    }
}

/// Terminal state of one event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The answer was delivered.
    Sent(SendReceipt),
    /// Nothing to answer (postback, unknown shape, empty text, no QA result).
    Skipped { reason: &'static str },
    /// QA or rewrite failed and the configured fallback text was delivered instead.
    FallbackSent { stage: Stage, error: RelayError },
    /// No reply was delivered.
    Failed { stage: Stage, error: RelayError },
}

/// Counts per outcome for one webhook batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub sent: usize,
    pub skipped: usize,
    pub fallback: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.sent + self.skipped + self.fallback + self.failed
    }

    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent(_) => self.sent += 1,
            DispatchOutcome::Skipped { .. } => self.skipped += 1,
            DispatchOutcome::FallbackSent { .. } => self.fallback += 1,
            DispatchOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Behaviour switches, from `dispatch` config.
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    pub rewrite_enabled: bool,
    pub fallback_text: Option<String>,
}

/// Runs the reply pipeline for inbound events.
#[derive(Clone)]
pub struct Dispatcher {
    qa: Arc<dyn DocumentQa>,
    llm: Arc<dyn Completion>,
    sender: Arc<dyn ReplySender>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        qa: Arc<dyn DocumentQa>,
        llm: Arc<dyn Completion>,
        sender: Arc<dyn ReplySender>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            qa,
            llm,
            sender,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Produce the reply text for `text`: QA, then the rewrite step when enabled.
    /// `Ok(None)` means the QA service had no answer.
    pub async fn answer(&self, text: &str) -> Result<Option<String>, (Stage, RelayError)> {
        let qa = self.qa.query(text).await.map_err(|e| (Stage::Qa, e))?;
        let Some(result) = qa.result.filter(|r| !r.trim().is_empty()) else {
            return Ok(None);
        };
        if !self.settings.rewrite_enabled {
            return Ok(Some(result));
        }
        let prompt = compose_rewrite_prompt(text, &result);
        let rewritten = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| (Stage::Rewrite, e))?;
        Ok(Some(rewritten))
    }

    /// Run one event to completion. Never panics on upstream failures; the outcome says what happened.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        log::debug!(
            "dispatching {} event from {}",
            event.kind(),
            event.sender_id().unwrap_or("?")
        );
        let (sender_id, text) = match event {
            InboundEvent::Message { sender_id, text } => (sender_id, text),
            InboundEvent::Postback { sender_id, payload } => {
                log::info!("postback from {}: {}", sender_id, payload);
                return DispatchOutcome::Skipped { reason: "postback" };
            }
            InboundEvent::Unknown { sender_id, reason } => {
                log::debug!(
                    "ignoring event from {}: {}",
                    sender_id.as_deref().unwrap_or("?"),
                    reason
                );
                return DispatchOutcome::Skipped { reason };
            }
        };
        if text.trim().is_empty() {
            return DispatchOutcome::Skipped { reason: "empty text" };
        }
        log::info!("message from {}: {}", sender_id, text);

        let reply_text = match self.answer(&text).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                log::info!("no answer for {}; not replying", sender_id);
                return DispatchOutcome::Skipped { reason: "no answer" };
            }
            Err((stage, error)) => {
                log::warn!("{} step failed for {}: {}", stage, sender_id, error);
                return self.fall_back(&sender_id, stage, error).await;
            }
        };

        match self.sender.send(OutboundReply::text(&sender_id, reply_text)).await {
            Ok(receipt) => {
                log::info!(
                    "sent message {} to {}",
                    receipt.message_id.as_deref().unwrap_or("?"),
                    receipt.recipient_id.as_deref().unwrap_or(&sender_id)
                );
                DispatchOutcome::Sent(receipt)
            }
            Err(error) => {
                log::error!("send failed for {}: {}", sender_id, error);
                DispatchOutcome::Failed {
                    stage: Stage::Send,
                    error,
                }
            }
        }
    }

    async fn fall_back(&self, sender_id: &str, stage: Stage, error: RelayError) -> DispatchOutcome {
        let Some(ref text) = self.settings.fallback_text else {
            return DispatchOutcome::Failed { stage, error };
        };
        match self.sender.send(OutboundReply::text(sender_id, text.as_str())).await {
            Ok(_) => DispatchOutcome::FallbackSent { stage, error },
            Err(send_err) => {
                log::error!("fallback send failed for {}: {}", sender_id, send_err);
                DispatchOutcome::Failed { stage, error }
            }
        }
    }

    /// Dispatch every event concurrently and wait for all of them to settle.
    pub async fn dispatch_all(&self, events: Vec<InboundEvent>) -> BatchSummary {
        let outcomes = join_all(events.into_iter().map(|ev| self.dispatch(ev))).await;
        let mut summary = BatchSummary::default();
        for o in &outcomes {
            summary.record(o);
        }
        summary
    }
}
