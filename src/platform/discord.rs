//! Discord REST adapter.
//!
//! Only the four endpoints the sweep needs are used:
//! - `GET /channels/{id}` to resolve a channel
//! - `GET /channels/{id}/messages?before=..&limit=..` to page through history
//! - `POST /channels/{id}/messages/bulk-delete` for batches
//! - `DELETE /channels/{id}/messages/{message_id}` for single messages
//!
//! Failed calls are never retried here; 429 responses surface as
//! [`PlatformError::RateLimited`] and the sweep decides what to do with them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::{Deserialize, Serialize};

use super::{
    Channel, ChannelId, ChatClient, HistoryCursor, Message, MessageId, PlatformError,
    PlatformResult,
};
use crate::config::DiscordPlatformConfig;

/// First millisecond of 2015, the zero point of Discord snowflakes.
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Bulk delete rejects fewer than two messages.
const MIN_BULK_DELETE: usize = 2;

/// Smallest snowflake that could have been issued at `time` (millisecond
/// precision).
pub fn snowflake_from_time(time: DateTime<Utc>) -> u64 {
    let ms = time.timestamp_millis();
    if ms <= DISCORD_EPOCH_MS {
        return 0;
    }
    ((ms - DISCORD_EPOCH_MS) as u64) << 22
}

struct DiscordApi {
    http: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl DiscordApi {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Discord bot client.
pub struct DiscordClient {
    api: Arc<DiscordApi>,
}

impl DiscordClient {
    pub fn new(config: &DiscordPlatformConfig) -> PlatformResult<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", config.token.trim()))
            .map_err(|e| PlatformError::InvalidRequest(format!("invalid bot token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "DiscordBot (https://crates.io/crates/retention-sweeper, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            )),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        Ok(Self {
            api: Arc::new(DiscordApi {
                http,
                base_url: config.api_base_url.trim_end_matches('/').to_string(),
                page_size: config.history_page_size,
            }),
        })
    }
}

#[async_trait]
impl ChatClient for DiscordClient {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn resolve_channel(&self, id: ChannelId) -> PlatformResult<Arc<dyn Channel>> {
        let response = self
            .api
            .http
            .get(self.api.url(&format!("/channels/{id}")))
            .send()
            .await
            .map_err(transport_error)?;

        let info: ChannelInfo = decode(check_status(response).await?).await?;
        tracing::debug!(channel_id = %info.id, name = ?info.name, "Resolved Discord channel");

        Ok(Arc::new(DiscordChannel {
            id,
            api: self.api.clone(),
        }))
    }
}

/// A resolved Discord text channel.
pub struct DiscordChannel {
    id: ChannelId,
    api: Arc<DiscordApi>,
}

#[async_trait]
impl Channel for DiscordChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn history_page_size(&self) -> usize {
        self.api.page_size
    }

    async fn fetch_history_page(
        &self,
        cursor: HistoryCursor,
        limit: usize,
    ) -> PlatformResult<Vec<Message>> {
        let before = match cursor {
            // `before` is exclusive, so bound on the following millisecond.
            HistoryCursor::NotAfter(time) => {
                snowflake_from_time(time + chrono::TimeDelta::milliseconds(1))
            }
            HistoryCursor::BeforeMessage(id) => id.get(),
        };

        let response = self
            .api
            .http
            .get(self.api.url(&format!("/channels/{}/messages", self.id)))
            .query(&[
                ("before", before.to_string()),
                ("limit", limit.clamp(1, 100).to_string()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let page: Vec<DiscordMessage> = decode(check_status(response).await?).await?;
        Ok(page
            .into_iter()
            .map(|m| Message {
                id: m.id,
                channel_id: m.channel_id,
                created_at: m.timestamp,
            })
            .collect())
    }

    async fn delete_messages(&self, messages: &[Message]) -> PlatformResult<()> {
        if messages.len() < MIN_BULK_DELETE {
            return match messages.first() {
                Some(single) => self.delete_message(single).await,
                None => Ok(()),
            };
        }

        let body = BulkDeleteRequest {
            messages: messages.iter().map(|m| m.id).collect(),
        };
        let response = self
            .api
            .http
            .post(
                self.api
                    .url(&format!("/channels/{}/messages/bulk-delete", self.id)),
            )
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_message(&self, message: &Message) -> PlatformResult<()> {
        let response = self
            .api
            .http
            .delete(
                self.api
                    .url(&format!("/channels/{}/messages/{}", self.id, message.id)),
            )
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: ChannelId,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: MessageId,
    channel_id: ChannelId,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct BulkDeleteRequest {
    messages: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after: Option<f64>,
}

fn transport_error(err: reqwest::Error) -> PlatformError {
    PlatformError::Transport(err.to_string())
}

/// Map non-success responses onto [`PlatformError`].
async fn check_status(response: reqwest::Response) -> PlatformResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();

    Err(match status {
        StatusCode::NOT_FOUND => PlatformError::NotFound,
        StatusCode::FORBIDDEN => PlatformError::Forbidden,
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            retry_after_ms: parsed
                .and_then(|b| b.retry_after)
                .map(|secs| (secs * 1000.0).ceil() as u64)
                .unwrap_or(0),
        },
        _ => PlatformError::Http {
            status: status.as_u16(),
            message: parsed.and_then(|b| b.message).unwrap_or(body),
        },
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> PlatformResult<T> {
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&body).map_err(|e| PlatformError::Decode(e.to_string()))
}
