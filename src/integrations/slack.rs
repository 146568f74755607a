//! Slack Web API client (only `chat.postMessage` is needed).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{truncate_body, ClientError};

pub const DEFAULT_BASE_URL: &str = "https://slack.com/api";

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ClientError> {
        debug!(channel, chars = text.len(), "posting slack message");
        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                service: "slack",
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        // Slack reports most failures as 200 with ok=false
        let parsed: SlackResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        if !parsed.ok {
            return Err(ClientError::Api {
                service: "slack",
                message: parsed.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(())
    }
}
