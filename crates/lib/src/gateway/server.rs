//! Gateway HTTP server: health probe and the Messenger webhook.

use crate::channels::MessengerClient;
use crate::config::{self, Config};
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::gateway::webhook::{receive_webhook, verify_webhook};
use crate::keepalive;
use crate::llm::CompletionClient;
use crate::outbound::ApiClient;
use crate::qa::QaClient;
use crate::storage::{self, StorageHandle};
use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const HEALTH_STATUS: &str = "Chatbot server is running successfully!";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Token the platform must present in the subscription handshake. None rejects every handshake.
    pub verify_token: Option<String>,
    pub dispatcher: Dispatcher,
    pub storage: StorageHandle,
}

impl GatewayState {
    pub fn new(verify_token: Option<String>, dispatcher: Dispatcher, storage: StorageHandle) -> Self {
        Self {
            verify_token,
            dispatcher,
            storage,
        }
    }
}

/// Build the dispatcher and its HTTP clients from config. Missing secrets are logged here;
/// the affected calls fail when an event reaches them.
pub fn build_dispatcher(config: &Config) -> Dispatcher {
    let api = ApiClient::new(config.outbound.timeout());

    let page_token = config::resolve_page_access_token(config);
    if page_token.is_none() {
        log::warn!("no page access token configured; replies cannot be sent");
    }
    let api_key = config::resolve_llm_api_key(config);
    if api_key.is_none() && config.dispatch.rewrite_enabled {
        log::warn!("no LLM api key configured; rewrite step will fail");
    }

    let qa = QaClient::new(&config.qa.base_url, api.clone());
    let llm = CompletionClient::new(&config.llm.base_url, api_key, &config.llm.model, api.clone())
        .with_attribution(config.llm.referer.clone(), config.llm.title.clone());
    let messenger = MessengerClient::new(
        &config.messenger.graph_api_base,
        &config.messenger.graph_api_version,
        page_token,
        api,
    );
    Dispatcher::new(
        Arc::new(qa),
        Arc::new(llm),
        Arc::new(messenger),
        DispatchSettings {
            rewrite_enabled: config.dispatch.rewrite_enabled,
            fallback_text: config
                .dispatch
                .fallback_text
                .clone()
                .filter(|t| !t.trim().is_empty()),
        },
    )
}

/// Routes: `GET /`, `GET /webhook`, `POST /webhook`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

/// Run the gateway until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let dispatcher = build_dispatcher(&config);
    if !dispatcher.settings().rewrite_enabled {
        log::info!("rewrite step disabled; QA answers are sent as-is");
    }
    let verify_token = config::resolve_verify_token(&config);
    if verify_token.is_none() {
        log::warn!("no verify token configured; webhook handshakes will be rejected");
    }

    let (storage, storage_task) =
        storage::spawn_probe(config::resolve_storage_uri(&config), &config.storage);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let keepalive_task = config::resolve_keepalive_url(&config).map(|url| {
        keepalive::spawn(
            ApiClient::new(config.outbound.timeout()),
            url,
            std::time::Duration::from_secs(config.keepalive.interval_secs),
            shutdown_rx,
        )
    });

    let app = router(GatewayState::new(verify_token, dispatcher, storage));

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx, keepalive_task, storage_task))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the keep-alive loop and abandons a storage probe that is still retrying.
async fn shutdown_signal(
    shutdown_tx: watch::Sender<bool>,
    keepalive_task: Option<JoinHandle<()>>,
    storage_task: Option<JoinHandle<()>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight webhooks");

    let _ = shutdown_tx.send(true);
    if let Some(h) = keepalive_task {
        let _ = h.await;
    }
    if let Some(h) = storage_task {
        h.abort();
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": HEALTH_STATUS,
        "storage": state.storage.status().await,
    }))
}
