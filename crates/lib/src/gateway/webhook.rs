//! Messenger webhook: subscription handshake (GET) and event ingress (POST).

use crate::channels::{flatten_events, PAGE_OBJECT};
use crate::gateway::server::GatewayState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::Value;

/// Body returned with every accepted batch.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

/// Subscribe mode sent by the platform during the handshake.
const SUBSCRIBE_MODE: &str = "subscribe";

/// `GET /webhook` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Handshake decision: 200 with the challenge echoed back, 403 on mismatch, 400 when mode or token is
/// missing or empty. With no expected token configured every present mode/token pair is rejected.
pub fn verify(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected: Option<&str>,
) -> (StatusCode, String) {
    let (Some(mode), Some(token)) = (
        mode.filter(|m| !m.is_empty()),
        token.filter(|t| !t.is_empty()),
    ) else {
        return (StatusCode::BAD_REQUEST, String::new());
    };
    match expected {
        Some(expected) if mode == SUBSCRIBE_MODE && token == expected => {
            log::info!("WEBHOOK_VERIFIED");
            (StatusCode::OK, challenge.unwrap_or_default().to_string())
        }
        _ => {
            log::warn!("webhook verification rejected (mode={})", mode);
            (StatusCode::FORBIDDEN, String::new())
        }
    }
}

/// GET /webhook — platform verification handshake.
pub async fn verify_webhook(
    State(state): State<GatewayState>,
    Query(q): Query<VerifyQuery>,
) -> (StatusCode, String) {
    verify(
        q.mode.as_deref(),
        q.verify_token.as_deref(),
        q.challenge.as_deref(),
        state.verify_token.as_deref(),
    )
}

/// POST /webhook — accepts a batch of page events, runs every event's pipeline, then acks.
///
/// The batch runs in its own task so a dropped platform connection does not cancel
/// pipelines that already started; the handler still waits for it before acking.
pub async fn receive_webhook(State(state): State<GatewayState>, body: Bytes) -> (StatusCode, &'static str) {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("webhook body is not JSON: {}", e);
            return (StatusCode::NOT_FOUND, "");
        }
    };
    if payload.get("object").and_then(|o| o.as_str()) != Some(PAGE_OBJECT) {
        log::debug!("webhook object is not a page subscription; ignoring");
        return (StatusCode::NOT_FOUND, "");
    }

    let events = flatten_events(&payload);
    let batch_id = uuid::Uuid::new_v4();
    log::info!("webhook batch {}: {} event(s)", batch_id, events.len());

    let dispatcher = state.dispatcher.clone();
    let batch = tokio::spawn(async move { dispatcher.dispatch_all(events).await });
    match batch.await {
        Ok(summary) => log::info!(
            "webhook batch {} settled {} event(s): {} sent, {} fallback, {} skipped, {} failed",
            batch_id,
            summary.total(),
            summary.sent,
            summary.fallback,
            summary.skipped,
            summary.failed
        ),
        Err(e) => log::error!("webhook batch {} task failed: {}", batch_id, e),
    }
    (StatusCode::OK, EVENT_RECEIVED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_echoes_challenge_on_match() {
        let (status, body) = verify(Some("subscribe"), Some("secret"), Some("c123"), Some("secret"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "c123");
    }

    #[test]
    fn verify_rejects_wrong_token_or_mode() {
        assert_eq!(
            verify(Some("subscribe"), Some("wrong"), Some("c123"), Some("secret")).0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            verify(Some("unsubscribe"), Some("secret"), Some("c123"), Some("secret")).0,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn verify_missing_params_is_bad_request() {
        assert_eq!(verify(None, None, Some("c123"), Some("secret")).0, StatusCode::BAD_REQUEST);
        assert_eq!(
            verify(Some("subscribe"), None, Some("c123"), Some("secret")).0,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn verify_empty_params_count_as_missing() {
        assert_eq!(
            verify(Some(""), Some(""), Some("c123"), Some("secret")).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            verify(Some("subscribe"), Some(""), Some("c123"), Some("secret")).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            verify(Some(""), Some("secret"), Some("c123"), Some("secret")).0,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn verify_without_configured_token_is_forbidden() {
        assert_eq!(
            verify(Some("subscribe"), Some("anything"), Some("c123"), None).0,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn verify_query_uses_hub_names() {
        let q: VerifyQuery = serde_json::from_str(
            r#"{"hub.mode":"subscribe","hub.verify_token":"t","hub.challenge":"c"}"#,
        )
        .unwrap();
        assert_eq!(q.mode.as_deref(), Some("subscribe"));
        assert_eq!(q.verify_token.as_deref(), Some("t"));
        assert_eq!(q.challenge.as_deref(), Some("c"));
    }
}
