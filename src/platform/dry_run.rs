//! Dry-run decorators.
//!
//! History is read from the wrapped platform as usual, but deletes are only
//! logged. Counts in the resulting report are what a real sweep would delete
//! on the first pass.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Channel, ChannelId, ChatClient, HistoryCursor, Message, PlatformResult};

/// Wraps a client so that every channel it resolves is a [`DryRunChannel`].
pub struct DryRunClient {
    inner: Arc<dyn ChatClient>,
}

impl DryRunClient {
    pub fn new(inner: Arc<dyn ChatClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChatClient for DryRunClient {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn resolve_channel(&self, id: ChannelId) -> PlatformResult<Arc<dyn Channel>> {
        let channel = self.inner.resolve_channel(id).await?;
        Ok(Arc::new(DryRunChannel { inner: channel }))
    }
}

/// A channel whose deletes succeed without touching the platform.
pub struct DryRunChannel {
    inner: Arc<dyn Channel>,
}

#[async_trait]
impl Channel for DryRunChannel {
    fn id(&self) -> ChannelId {
        self.inner.id()
    }

    fn guarantees_descending_order(&self) -> bool {
        self.inner.guarantees_descending_order()
    }

    fn history_page_size(&self) -> usize {
        self.inner.history_page_size()
    }

    async fn fetch_history_page(
        &self,
        cursor: HistoryCursor,
        limit: usize,
    ) -> PlatformResult<Vec<Message>> {
        self.inner.fetch_history_page(cursor, limit).await
    }

    async fn delete_messages(&self, messages: &[Message]) -> PlatformResult<()> {
        tracing::info!(
            channel_id = %self.inner.id(),
            count = messages.len(),
            oldest = ?messages.last().map(|m| m.created_at),
            "DRY RUN: Would bulk delete {} messages",
            messages.len()
        );
        Ok(())
    }

    async fn delete_message(&self, message: &Message) -> PlatformResult<()> {
        tracing::info!(
            channel_id = %self.inner.id(),
            message_id = %message.id,
            created_at = %message.created_at,
            "DRY RUN: Would delete message {}",
            message.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::platform::memory::{MemoryChannel, MemoryPlatform};

    #[tokio::test]
    async fn test_dry_run_never_deletes() {
        let now = Utc::now();
        let platform = Arc::new(MemoryPlatform::new());
        let memory = platform.add_channel(MemoryChannel::new(ChannelId::new(3)));
        memory.push_aged(now, TimeDelta::days(10), 2);
        memory.push_aged(now, TimeDelta::days(30), 1);

        let client = DryRunClient::new(platform.clone());
        let channel = client.resolve_channel(ChannelId::new(3)).await.unwrap();
        let messages = channel
            .fetch_history_page(HistoryCursor::NotAfter(now), 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);

        channel.delete_messages(&messages[..2]).await.unwrap();
        channel.delete_message(&messages[2]).await.unwrap();

        assert_eq!(memory.remaining().len(), 3);
        assert!(memory.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_passes_through_not_found() {
        let client = DryRunClient::new(Arc::new(MemoryPlatform::new()));
        assert!(client.resolve_channel(ChannelId::new(1)).await.is_err());
    }
}
