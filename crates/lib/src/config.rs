//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.docrelay/config.json`) and environment.
//! Secrets are usually supplied through the environment; the file carries endpoints and switches.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messenger platform settings (tokens, Graph API endpoint).
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Document-QA service.
    #[serde(default)]
    pub qa: QaConfig,

    /// LLM completion service used to rewrite answers.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Per-event pipeline switches.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Timeouts shared by every outbound call.
    #[serde(default)]
    pub outbound: OutboundConfig,

    /// Keep-alive pinger.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,

    /// Storage backend connection probe.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 2000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the platform must reach the webhook).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    2000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Messenger page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessengerConfig {
    /// Page access token for the Send API. Overridden by FACEBOOK_PAGE_ACCESS_TOKEN env.
    pub page_access_token: Option<String>,
    /// Token expected in the webhook subscription handshake. Overridden by FACEBOOK_VERIFY_TOKEN env.
    /// When unset, the page access token is used.
    pub verify_token: Option<String>,
    /// Graph API base URL (default "https://graph.facebook.com").
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    /// Graph API version segment (default "v12.0").
    #[serde(default = "default_graph_api_version")]
    pub graph_api_version: String,
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_api_version() -> String {
    "v12.0".to_string()
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            page_access_token: None,
            verify_token: None,
            graph_api_base: default_graph_api_base(),
            graph_api_version: default_graph_api_version(),
        }
    }
}

/// Document-QA service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaConfig {
    /// Service root; queries go to `<baseUrl>/query`. Overridden by QA_BASE_URL env.
    #[serde(default = "default_qa_base_url")]
    pub base_url: String,
}

fn default_qa_base_url() -> String {
    "https://book-business-custom-chatbot.onrender.com".to_string()
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            base_url: default_qa_base_url(),
        }
    }
}

/// OpenAI-compatible completion endpoint (OpenRouter by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Base URL; requests go to `<baseUrl>/chat/completions`.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Bearer token. Overridden by OPENROUTER_API_KEY env.
    pub api_key: Option<String>,
    /// Model id passed as-is to the endpoint.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Optional HTTP-Referer header (OpenRouter attribution).
    pub referer: Option<String>,
    /// Optional X-Title header (OpenRouter attribution).
    pub title: Option<String>,
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "deepseek/deepseek-r1:free".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_llm_model(),
            referer: Some("http://localhost:2000".to_string()),
            title: Some("Chatbot".to_string()),
        }
    }
}

/// Pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Pass the QA answer through the LLM before replying (default true).
    #[serde(default = "default_true")]
    pub rewrite_enabled: bool,
    /// Text sent to the user when the QA or rewrite step fails. Unset = no reply on failure.
    #[serde(default)]
    pub fallback_text: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rewrite_enabled: true,
            fallback_text: None,
        }
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundConfig {
    /// Per-call timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OutboundConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Keep-alive pinger: GETs a URL on a fixed interval so an idle host is not put to sleep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeepaliveConfig {
    /// Default true. The URL defaults to the QA base URL.
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: Option<String>,
    /// Seconds between pings (default 10).
    #[serde(default = "default_keepalive_interval")]
    pub interval_secs: u64,
}

fn default_keepalive_interval() -> u64 {
    10
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            interval_secs: default_keepalive_interval(),
        }
    }
}

/// Storage backend. Only pinged at startup; nothing is read or written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Connection string. Overridden by MONGO_URI env.
    pub uri: Option<String>,
    /// Seconds between connection attempts (default 5).
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Give up after this many attempts; 0 retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_retry_delay() -> u64 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uri: None,
            retry_delay_secs: default_retry_delay(),
            max_attempts: 0,
        }
    }
}

/// Read a non-empty, trimmed environment variable.
fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(v: Option<&String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the page access token: env FACEBOOK_PAGE_ACCESS_TOKEN overrides config.
pub fn resolve_page_access_token(config: &Config) -> Option<String> {
    env_nonempty("FACEBOOK_PAGE_ACCESS_TOKEN")
        .or_else(|| trimmed(config.messenger.page_access_token.as_ref()))
}

/// Resolve the webhook verify token: env FACEBOOK_VERIFY_TOKEN, then config, then the page access token.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_nonempty("FACEBOOK_VERIFY_TOKEN")
        .or_else(|| trimmed(config.messenger.verify_token.as_ref()))
        .or_else(|| resolve_page_access_token(config))
}

/// Resolve the LLM API key: env OPENROUTER_API_KEY overrides config.
pub fn resolve_llm_api_key(config: &Config) -> Option<String> {
    env_nonempty("OPENROUTER_API_KEY").or_else(|| trimmed(config.llm.api_key.as_ref()))
}

/// Resolve the storage connection string: env MONGO_URI overrides config.
pub fn resolve_storage_uri(config: &Config) -> Option<String> {
    env_nonempty("MONGO_URI").or_else(|| trimmed(config.storage.uri.as_ref()))
}

/// Resolve the keep-alive target, defaulting to the QA service root. None when disabled.
pub fn resolve_keepalive_url(config: &Config) -> Option<String> {
    if !config.keepalive.enabled {
        return None;
    }
    trimmed(config.keepalive.url.as_ref())
        .or_else(|| Some(config.qa.base_url.trim_end_matches('/').to_string()))
        .filter(|s| !s.is_empty())
}

/// Apply the plain environment overrides (PORT, QA_BASE_URL) to a loaded config.
/// Secrets are resolved lazily by the `resolve_*` helpers instead.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(port) = env_nonempty("PORT") {
        match port.parse::<u16>() {
            Ok(p) => config.gateway.port = p,
            Err(_) => log::warn!("ignoring invalid PORT value: {}", port),
        }
    }
    if let Some(url) = env_nonempty("QA_BASE_URL") {
        config.qa.base_url = url;
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("DOCRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".docrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or DOCRELAY_CONFIG_PATH). Missing file => default config.
/// Environment overrides are applied. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}
