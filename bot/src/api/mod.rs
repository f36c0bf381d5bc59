use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::{instrument, trace};

use shared::{Notifier, NotifyError, UserId};

pub mod prometheus;

pub use shared::github::*;

const API_BASE: &str = "https://discord.com/api/v10";
/// Discord returns at most 100 messages per request.
const PAGE_SIZE: u8 = 100;
/// Percent-encoded ✅
const CHECK_MARK: &str = "%E2%9C%85";

pub type ChannelId = u64;
pub type MessageId = u64;

fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    #[serde(deserialize_with = "snowflake")]
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl DiscordUser {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    #[serde(deserialize_with = "snowflake")]
    pub id: MessageId,
    #[serde(deserialize_with = "snowflake")]
    pub channel_id: ChannelId,
    pub author: DiscordUser,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
}

#[derive(Debug, Deserialize)]
struct DmChannel {
    #[serde(deserialize_with = "snowflake")]
    id: ChannelId,
}

#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    log_channel_id: ChannelId,
    timeout: Duration,
    prometheus: Arc<prometheus::PrometheusClient>,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("log_channel_id", &self.log_channel_id)
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(
        token: &str,
        log_channel_id: ChannelId,
        timeout: Duration,
        prometheus: Arc<prometheus::PrometheusClient>,
    ) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bot {token}"))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!(
                "DiscordBot (hundred-days-bot, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            log_channel_id,
            timeout,
            prometheus,
        })
    }

    pub fn log_channel_id(&self) -> ChannelId {
        self.log_channel_id
    }

    fn transport_error(&self, error: reqwest::Error) -> NotifyError {
        if error.is_timeout() {
            NotifyError::Timeout(self.timeout)
        } else {
            NotifyError::Other(error.into())
        }
    }

    async fn check(&self, response: Response) -> Result<Response, NotifyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::FORBIDDEN => NotifyError::Denied(body),
            _ => NotifyError::Other(anyhow::anyhow!("Discord answered HTTP {status}: {body}")),
        })
    }

    pub async fn current_user(&self) -> anyhow::Result<DiscordUser> {
        let response = self
            .client
            .get(format!("{API_BASE}/users/@me"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(self.check(response).await?.json().await?)
    }

    /// Messages newer than `after`, oldest first.
    #[instrument(skip(self))]
    pub async fn messages_after(
        &self,
        channel_id: ChannelId,
        after: MessageId,
    ) -> anyhow::Result<Vec<DiscordMessage>> {
        let response = self
            .client
            .get(format!("{API_BASE}/channels/{channel_id}/messages"))
            .query(&[("after", after.to_string()), ("limit", PAGE_SIZE.to_string())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let mut messages: Vec<DiscordMessage> = self.check(response).await?.json().await?;
        messages.sort_by_key(|message| message.id);
        trace!("Fetched {} messages from {channel_id}", messages.len());
        Ok(messages)
    }

    /// The id to start polling from, so history is not replayed on startup.
    pub async fn latest_message_id(&self, channel_id: ChannelId) -> anyhow::Result<MessageId> {
        let response = self
            .client
            .get(format!("{API_BASE}/channels/{channel_id}/messages"))
            .query(&[("limit", "1")])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let messages: Vec<DiscordMessage> = self.check(response).await?.json().await?;
        Ok(messages.first().map(|message| message.id).unwrap_or_default())
    }

    #[instrument(skip(self, text))]
    pub async fn send(&self, channel_id: ChannelId, text: &str) -> Result<(), NotifyError> {
        self.post_message(channel_id, json!({ "content": text }))
            .await
    }

    #[instrument(skip(self, text))]
    pub async fn reply(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), NotifyError> {
        self.post_message(
            channel_id,
            json!({
                "content": text,
                "message_reference": { "message_id": message_id.to_string(), "fail_if_not_exists": false },
                "allowed_mentions": { "parse": ["users"], "replied_user": true },
            }),
        )
        .await
    }

    async fn post_message(
        &self,
        channel_id: ChannelId,
        body: serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.prometheus.add_write_request();
        let response = self
            .client
            .post(format!("{API_BASE}/channels/{channel_id}/messages"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn react_accepted(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), NotifyError> {
        self.prometheus.add_write_request();
        let response = self
            .client
            .put(format!(
                "{API_BASE}/channels/{channel_id}/messages/{message_id}/reactions/{CHECK_MARK}/@me"
            ))
            .header(header::CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check(response).await?;
        Ok(())
    }

    async fn open_dm(&self, user_id: UserId) -> Result<ChannelId, NotifyError> {
        let response = self
            .client
            .post(format!("{API_BASE}/users/@me/channels"))
            .json(&json!({ "recipient_id": user_id.to_string() }))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let channel: DmChannel = self
            .check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(channel.id)
    }
}

#[async_trait]
impl Notifier for DiscordClient {
    async fn direct_message(&self, user_id: UserId, text: &str) -> Result<(), NotifyError> {
        let channel_id = self.open_dm(user_id).await?;
        self.send(channel_id, text).await
    }

    async fn announce(&self, text: &str) -> Result<(), NotifyError> {
        self.send(self.log_channel_id, text).await
    }
}
