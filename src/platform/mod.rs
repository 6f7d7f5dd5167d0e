//! Chat platform abstraction.
//!
//! The sweep engine only needs four things from a chat platform: resolve a
//! channel, walk its history backwards, and delete messages either in bulk or
//! one at a time. Those needs are captured by the [`ChatClient`] and
//! [`Channel`] traits. Concrete platforms:
//!
//! - [`discord::DiscordClient`]: the Discord REST API
//! - [`memory::MemoryPlatform`]: in-process channels with failure injection
//! - [`dry_run::DryRunClient`]: wraps another client and turns deletes into logs

pub mod discord;
pub mod dry_run;
pub mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{
    TryStreamExt,
    stream::{self, BoxStream, StreamExt},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::PlatformConfig;

/// Default (and maximum) number of messages Discord returns per history page.
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 100;

/// Most messages a single bulk delete call may name.
pub const MAX_BULK_DELETE: usize = 100;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserialize_snowflake(deserializer).map(Self)
            }
        }
    };
}

snowflake_id!(
    /// Channel identifier. Accepted as an integer or a decimal string.
    ChannelId
);

snowflake_id!(
    /// Message identifier, unique within a channel.
    MessageId
);

/// Platform IDs arrive as JSON strings from Discord and as integers or
/// strings from hand-written config files.
fn deserialize_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid snowflake ID: {s:?}"))),
    }
}

/// A message as seen by the sweep engine. Content is never fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub created_at: DateTime<Utc>,
}

/// Where a history page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCursor {
    /// Messages created at or before this instant.
    NotAfter(DateTime<Utc>),
    /// Messages that come after this one in history order.
    BeforeMessage(MessageId),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found")]
    NotFound,

    #[error("missing permissions")]
    Forbidden,

    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode platform response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PlatformError {
    /// Short, stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::Http { .. } => "http",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Create the client for the configured platform.
///
/// `channels` seeds the in-memory platform, which otherwise knows no channels.
pub fn build_client(
    config: &PlatformConfig,
    channels: &[ChannelId],
) -> PlatformResult<Arc<dyn ChatClient>> {
    let client: Arc<dyn ChatClient> = match config {
        PlatformConfig::Discord(discord) => Arc::new(discord::DiscordClient::new(discord)?),
        PlatformConfig::Memory(_) => Arc::new(memory::MemoryPlatform::with_empty_channels(
            channels.iter().copied(),
        )),
    };
    Ok(client)
}

/// A channel whose history can be walked and pruned.
#[async_trait]
pub trait Channel: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Whether history pages come back strictly newest-first.
    ///
    /// When true, the sweeper stops walking at the first message that is too
    /// young to delete. When false, it skips such messages and keeps walking.
    fn guarantees_descending_order(&self) -> bool {
        true
    }

    /// Messages requested per history page.
    fn history_page_size(&self) -> usize {
        DEFAULT_HISTORY_PAGE_SIZE
    }

    /// Fetch one page of history starting at `cursor`, at most `limit` messages.
    async fn fetch_history_page(
        &self,
        cursor: HistoryCursor,
        limit: usize,
    ) -> PlatformResult<Vec<Message>>;

    /// Delete between 1 and the platform's batch limit of messages in one call.
    async fn delete_messages(&self, messages: &[Message]) -> PlatformResult<()>;

    /// Delete a single message.
    async fn delete_message(&self, message: &Message) -> PlatformResult<()>;
}

/// Resolves channel IDs into channels.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Short platform name for logs.
    fn name(&self) -> &'static str;

    /// Look up a channel. Unknown channels yield [`PlatformError::NotFound`].
    async fn resolve_channel(&self, id: ChannelId) -> PlatformResult<Arc<dyn Channel>>;
}

/// Lazily walk a channel's history, newest first, starting with messages
/// created at or before `not_after`. Pages are fetched on demand, so dropping
/// the stream stops all further requests.
pub fn history<'a>(
    channel: &'a dyn Channel,
    not_after: DateTime<Utc>,
) -> BoxStream<'a, PlatformResult<Message>> {
    let page_size = channel.history_page_size().max(1);

    stream::try_unfold(
        Some(HistoryCursor::NotAfter(not_after)),
        move |cursor| async move {
            let Some(cursor) = cursor else {
                return Ok(None);
            };

            let page = channel.fetch_history_page(cursor, page_size).await?;
            if page.is_empty() {
                return Ok(None);
            }

            // A short page means the channel has no older messages.
            let next = if page.len() < page_size {
                None
            } else {
                page.last().map(|m| HistoryCursor::BeforeMessage(m.id))
            };

            Ok(Some((page, next)))
        },
    )
    .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
