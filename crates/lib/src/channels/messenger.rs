//! Messenger Send API client: `POST <graph>/<version>/me/messages?access_token=...`.

use crate::channels::reply::{OutboundReply, ReplySender, SendReceipt};
use crate::outbound::{error_message, ApiClient, RelayError};
use async_trait::async_trait;

/// Sends replies as the page through the Graph API.
#[derive(Clone)]
pub struct MessengerClient {
    graph_api_base: String,
    graph_api_version: String,
    page_access_token: Option<String>,
    api: ApiClient,
}

impl MessengerClient {
    pub fn new(
        graph_api_base: &str,
        graph_api_version: &str,
        page_access_token: Option<String>,
        api: ApiClient,
    ) -> Self {
        Self {
            graph_api_base: graph_api_base.trim_end_matches('/').to_string(),
            graph_api_version: graph_api_version.trim_matches('/').to_string(),
            page_access_token,
            api,
        }
    }

    /// Send API URL with the access token as a query parameter (percent-encoded).
    fn messages_url(&self, token: &str) -> Result<reqwest::Url, RelayError> {
        let base = format!(
            "{}/{}/me/messages",
            self.graph_api_base, self.graph_api_version
        );
        reqwest::Url::parse_with_params(&base, &[("access_token", token)])
            .map_err(|e| RelayError::InvalidEndpoint(format!("{} ({})", base, e)))
    }
}

#[async_trait]
impl ReplySender for MessengerClient {
    async fn send(&self, reply: OutboundReply) -> Result<SendReceipt, RelayError> {
        let token = self
            .page_access_token
            .as_deref()
            .ok_or(RelayError::NotConfigured("page access token"))?;
        let url = self.messages_url(token)?;
        let body = serde_json::to_value(&reply)
            .map_err(|e| RelayError::MalformedResponse(format!("encoding reply: {}", e)))?;
        let data = self.api.post_json(url.as_str(), &[], &body).await?;
        if let Some(err) = error_message(&data) {
            return Err(RelayError::UpstreamLogical(err));
        }
        serde_json::from_value(data)
            .map_err(|e| RelayError::MalformedResponse(format!("send api body: {}", e)))
    }
}
