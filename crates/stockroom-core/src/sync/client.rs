//! HTTP transport for the sync server.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::protocol::{PullResponse, PushRequest, PushResponse};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::util::compact_text;

/// The single outbound network call each task makes.
///
/// Engine tests substitute an in-memory implementation.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Upload dirty records
    async fn push(&self, request: &PushRequest) -> Result<PushResponse>;

    /// Fetch server updates after `since` (everything when `None`)
    async fn pull(&self, since: Option<&str>) -> Result<PullResponse>;
}

/// Bearer-authenticated, timeout-bounded client for `/sync/push` and `/sync/pull`
#[derive(Clone)]
pub struct HttpSyncClient {
    push_url: String,
    pull_url: String,
    auth_token: String,
    user_id: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncClient")
            .field("push_url", &self.push_url)
            .field("pull_url", &self.pull_url)
            .field("auth_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl HttpSyncClient {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            push_url: config.push_url(),
            pull_url: config.pull_url(),
            auth_token: config.auth_token.trim().to_string(),
            user_id: config.user_id.trim().to_string(),
            client,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Server {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }
        if body.trim().is_empty() {
            return Err(Error::InvalidPayload("empty response body".to_string()));
        }
        serde_json::from_str(&body).map_err(|error| {
            Error::InvalidPayload(format!("{error}: {}", compact_text(&body)))
        })
    }
}

#[async_trait]
impl SyncTransport for HttpSyncClient {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        tracing::debug!(
            url = %self.push_url,
            records = request.record_count(),
            "Sending push request"
        );
        let response = self
            .client
            .post(&self.push_url)
            .bearer_auth(&self.auth_token)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn pull(&self, since: Option<&str>) -> Result<PullResponse> {
        tracing::debug!(url = %self.pull_url, since = ?since, "Sending pull request");
        let mut query = vec![("user", self.user_id.as_str())];
        if let Some(since) = since {
            query.push(("since", since));
        }
        let response = self
            .client
            .get(&self.pull_url)
            .bearer_auth(&self.auth_token)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await?;
        Self::read_json(response).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        compact_text(trimmed)
    }
}
