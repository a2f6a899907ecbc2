//! Integration test: start the gateway on a free port against mock QA, LLM and Send API
//! servers, then drive the webhook over HTTP. The server tasks are left running when each test ends.
//!
//! `run_gateway` resolves secrets and the storage URI environment-first, so these tests refuse
//! to run while any of `RELAY_ENV_OVERRIDES` is set in the shell. `PORT` and `QA_BASE_URL` only
//! apply in `load_config`, which the tests bypass.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lib::config::Config;
use lib::gateway;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const VERIFY_TOKEN: &str = "verify-secret";

/// Recipient the mock Send API refuses with a 200 and a Graph error body.
const UNAVAILABLE_USER: &str = "unavailable-user";

/// Variables that would win over `test_config` and point the gateway elsewhere.
const RELAY_ENV_OVERRIDES: &[&str] = &[
    "FACEBOOK_PAGE_ACCESS_TOKEN",
    "FACEBOOK_VERIFY_TOKEN",
    "OPENROUTER_API_KEY",
    "MONGO_URI",
];

fn assert_no_env_overrides() {
    let set: Vec<&str> = RELAY_ENV_OVERRIDES
        .iter()
        .copied()
        .filter(|k| std::env::var(k).map(|v| !v.trim().is_empty()).unwrap_or(false))
        .collect();
    assert!(
        set.is_empty(),
        "unset {:?} before running the gateway tests; they override the test config",
        set
    );
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Requests seen by the mock upstreams.
#[derive(Clone, Default)]
struct Upstream {
    qa: Arc<Mutex<Vec<String>>>,
    llm: Arc<Mutex<Vec<String>>>,
    sent: Arc<Mutex<Vec<Value>>>,
    pings: Arc<Mutex<usize>>,
}

impl Upstream {
    fn qa_calls(&self) -> Vec<String> {
        self.qa.lock().unwrap().clone()
    }
    fn llm_prompts(&self) -> Vec<String> {
        self.llm.lock().unwrap().clone()
    }
    fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }
}

async fn mock_qa(State(up): State<Upstream>, Json(body): Json<Value>) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default().to_string();
    up.qa.lock().unwrap().push(query.clone());
    match query.as_str() {
        "fail" => Json(json!({ "error": "x" })),
        "nothing" => Json(json!({})),
        "slow" => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Json(json!({ "result": "slow answer" }))
        }
        _ => Json(json!({ "result": "Paris is the capital of France." })),
    }
}

async fn mock_llm(State(up): State<Upstream>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let prompt = body["messages"][0]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    up.llm.lock().unwrap().push(prompt.clone());
    if prompt.contains("llm-down") {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "down" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "Rewritten answer." } }] })),
    )
}

async fn mock_send(
    State(up): State<Upstream>,
    Query(q): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    up.sent.lock().unwrap().push(body.clone());
    if body["recipient"]["id"] == UNAVAILABLE_USER {
        return (
            StatusCode::OK,
            Json(json!({ "error": { "message": "(#551) This person isn't available right now.", "code": 551 } })),
        );
    }
    if q.get("access_token").map(String::as_str) != Some("page-token") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "Invalid token" } })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "message_id": "m.1", "recipient_id": body["recipient"]["id"] })),
    )
}

async fn mock_ping(State(up): State<Upstream>) -> Json<Value> {
    *up.pings.lock().unwrap() += 1;
    Json(json!({ "status": "ok" }))
}

/// Serve the mock upstreams; returns their base URL.
async fn start_upstream(up: Upstream) -> String {
    let app = Router::new()
        .route("/", get(mock_ping))
        .route("/query", post(mock_qa))
        .route("/v1/chat/completions", post(mock_llm))
        .route("/v12.0/me/messages", post(mock_send))
        .with_state(up);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

fn test_config(upstream: &str, port: u16) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.qa.base_url = upstream.to_string();
    config.llm.base_url = format!("{}/v1", upstream);
    config.llm.api_key = Some("llm-key".to_string());
    config.messenger.graph_api_base = upstream.to_string();
    config.messenger.page_access_token = Some("page-token".to_string());
    config.messenger.verify_token = Some(VERIFY_TOKEN.to_string());
    config.keepalive.enabled = false;
    config.outbound.timeout_secs = 5;
    config
}

/// Start the gateway and wait until GET / answers. Returns its base URL.
async fn start_gateway(config: Config) -> String {
    let base = format!("http://127.0.0.1:{}", config.gateway.port);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/", base)).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway at {} did not come up within 5s", base);
}

async fn setup(configure: impl FnOnce(&mut Config)) -> (String, Upstream) {
    assert_no_env_overrides();
    let up = Upstream::default();
    let upstream = start_upstream(up.clone()).await;
    let mut config = test_config(&upstream, free_port());
    configure(&mut config);
    (start_gateway(config).await, up)
}

fn page_batch(events: Value) -> Value {
    json!({ "object": "page", "entry": [{ "id": "p1", "time": 1, "messaging": events }] })
}

fn text_event(sender: &str, text: &str) -> Value {
    json!({ "sender": { "id": sender }, "recipient": { "id": "p1" }, "message": { "mid": "m", "text": text } })
}

async fn post_webhook(base: &str, body: &Value) -> (StatusCode, String) {
    let resp = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .json(body)
        .send()
        .await
        .expect("post webhook");
    let status = StatusCode::from_u16(resp.status().as_u16()).expect("status");
    (status, resp.text().await.unwrap_or_default())
}

#[tokio::test]
async fn health_reports_running_and_storage_state() {
    let (base, _) = setup(|_| {}).await;
    let json: Value = reqwest::get(format!("{}/", base))
        .await
        .expect("GET /")
        .json()
        .await
        .expect("parse JSON");
    assert_eq!(
        json["status"].as_str(),
        Some("Chatbot server is running successfully!")
    );
    assert_eq!(json["storage"].as_str(), Some("disabled"));
}

#[tokio::test]
async fn verification_handshake() {
    let (base, _) = setup(|_| {}).await;
    let client = reqwest::Client::new();

    let ok = client
        .get(format!(
            "{}/webhook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=c123",
            base, VERIFY_TOKEN
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status().as_u16(), 200);
    assert_eq!(ok.text().await.unwrap(), "c123");

    let wrong = client
        .get(format!(
            "{}/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=c123",
            base
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 403);

    let missing = client
        .get(format!("{}/webhook?hub.challenge=c123", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 400);
}

#[tokio::test]
async fn non_page_object_is_not_found_and_calls_nothing() {
    let (base, up) = setup(|_| {}).await;
    let body = json!({ "object": "instagram", "entry": [{ "messaging": [text_event("u1", "hi")] }] });
    let (status, _) = post_webhook(&base, &body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(up.qa_calls().is_empty());
    assert!(up.sent().is_empty());
}

#[tokio::test]
async fn ack_waits_for_every_event_in_the_batch() {
    let (base, up) = setup(|c| c.dispatch.rewrite_enabled = false).await;
    let body = page_batch(json!([
        text_event("slow-user", "slow"),
        text_event("fast-user", "Capital of France?"),
        { "sender": { "id": "u3" }, "postback": { "payload": "GET_STARTED" } }
    ]));
    let (status, text) = post_webhook(&base, &body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "EVENT_RECEIVED");

    // Both pipelines settled before the ack; the postback never reached QA.
    assert_eq!(up.qa_calls().len(), 2);
    let sent = up.sent();
    assert_eq!(sent.len(), 2);
    let mut recipients: Vec<&str> = sent
        .iter()
        .filter_map(|b| b["recipient"]["id"].as_str())
        .collect();
    recipients.sort_unstable();
    assert_eq!(recipients, vec!["fast-user", "slow-user"]);
    assert!(sent
        .iter()
        .any(|b| b["message"]["text"] == "Paris is the capital of France."));
}

#[tokio::test]
async fn rewrite_step_sends_llm_output() {
    let (base, up) = setup(|_| {}).await;
    let (status, _) = post_webhook(&base, &page_batch(json!([text_event("u1", "Capital of France?")]))).await;
    assert_eq!(status, StatusCode::OK);

    let prompts = up.llm_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Capital of France?"));
    assert!(prompts[0].contains("Paris is the capital of France."));
    assert_eq!(
        up.sent(),
        vec![json!({ "recipient": { "id": "u1" }, "message": { "text": "Rewritten answer." } })]
    );
}

#[tokio::test]
async fn qa_error_sends_no_reply_but_still_acks() {
    let (base, up) = setup(|_| {}).await;
    let (status, text) = post_webhook(&base, &page_batch(json!([text_event("u1", "fail")]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "EVENT_RECEIVED");
    assert_eq!(up.qa_calls(), vec!["fail".to_string()]);
    assert!(up.llm_prompts().is_empty());
    assert!(up.sent().is_empty());
}

#[tokio::test]
async fn qa_error_sends_configured_fallback() {
    let (base, up) = setup(|c| c.dispatch.fallback_text = Some("Sorry, try later.".to_string())).await;
    post_webhook(&base, &page_batch(json!([text_event("u1", "fail")]))).await;
    assert_eq!(
        up.sent(),
        vec![json!({ "recipient": { "id": "u1" }, "message": { "text": "Sorry, try later." } })]
    );
}

#[tokio::test]
async fn send_api_rejection_is_acked_without_retry() {
    let (base, up) = setup(|c| {
        c.messenger.page_access_token = Some("bad-token".to_string());
        c.dispatch.rewrite_enabled = false;
    })
    .await;
    let (status, text) = post_webhook(&base, &page_batch(json!([text_event("u1", "Capital?")]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "EVENT_RECEIVED");
    assert_eq!(up.sent().len(), 1);
}

#[tokio::test]
async fn send_api_error_body_is_acked_without_retry() {
    let (base, up) = setup(|c| c.dispatch.fallback_text = Some("Sorry, try later.".to_string())).await;
    let (status, text) =
        post_webhook(&base, &page_batch(json!([text_event(UNAVAILABLE_USER, "Capital?")]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "EVENT_RECEIVED");
    // One attempt, no retry and no fallback after a failed send.
    let sent = up.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["message"]["text"], "Rewritten answer.");
}

#[tokio::test]
async fn llm_failure_skips_send() {
    let (base, up) = setup(|_| {}).await;
    let (status, _) = post_webhook(&base, &page_batch(json!([text_event("u1", "llm-down please")]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(up.llm_prompts().len(), 1);
    assert!(up.sent().is_empty());
}

#[tokio::test]
async fn missing_qa_result_sends_nothing() {
    let (base, up) = setup(|_| {}).await;
    post_webhook(&base, &page_batch(json!([text_event("u1", "nothing")]))).await;
    assert!(up.llm_prompts().is_empty());
    assert!(up.sent().is_empty());
}

#[tokio::test]
async fn keepalive_pings_upstream() {
    let (_, up) = setup(|c| {
        c.keepalive.enabled = true;
        c.keepalive.interval_secs = 1;
    })
    .await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(*up.pings.lock().unwrap() >= 1);
}
