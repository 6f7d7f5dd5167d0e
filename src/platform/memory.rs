//! In-memory chat platform with configurable failure modes.
//!
//! Channels live entirely in process memory and every delete call is recorded,
//! which makes this platform suitable for exercising the sweep engine without
//! network access. It supports several failure modes for testing error
//! containment:
//! - `FailBatchCall`: the Nth bulk delete call fails
//! - `FailSingle`: single deletes of specific messages fail
//! - `FailHistoryAfter`: history paging fails after N pages

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};

use super::{
    Channel, ChannelId, ChatClient, DEFAULT_HISTORY_PAGE_SIZE, HistoryCursor, MAX_BULK_DELETE,
    Message, MessageId, PlatformError, PlatformResult,
};

/// A delete call observed by a [`MemoryChannel`], in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCall {
    Batch(Vec<MessageId>),
    Single(MessageId),
}

/// Failure injected into a [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFailure {
    /// The Nth bulk delete call (1-based) fails and deletes nothing.
    FailBatchCall(u32),
    /// Single deletes of these messages fail.
    FailSingle(HashSet<MessageId>),
    /// History pages after the first N fail.
    FailHistoryAfter(u32),
}

/// An in-memory channel.
pub struct MemoryChannel {
    id: ChannelId,
    page_size: usize,
    /// When false, history is served in insertion order instead of newest first.
    descending: bool,
    failures: Vec<MemoryFailure>,
    /// Every message ever posted; deleted ones stay here as cursor anchors.
    messages: Mutex<Vec<Message>>,
    deleted: Mutex<HashSet<MessageId>>,
    next_id: Mutex<u64>,
    calls: Mutex<Vec<DeleteCall>>,
    batch_calls: AtomicU32,
    history_pages: AtomicU32,
}

impl MemoryChannel {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            page_size: DEFAULT_HISTORY_PAGE_SIZE,
            descending: true,
            failures: Vec::new(),
            messages: Mutex::new(Vec::new()),
            deleted: Mutex::new(HashSet::new()),
            next_id: Mutex::new(1),
            calls: Mutex::new(Vec::new()),
            batch_calls: AtomicU32::new(0),
            history_pages: AtomicU32::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Serve history in insertion order and stop promising descending order.
    pub fn with_unordered_history(mut self) -> Self {
        self.descending = false;
        self
    }

    pub fn with_failure(mut self, failure: MemoryFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn with_batch_failure(self, call_number: u32) -> Self {
        self.with_failure(MemoryFailure::FailBatchCall(call_number))
    }

    pub fn with_history_failure_after(self, pages: u32) -> Self {
        self.with_failure(MemoryFailure::FailHistoryAfter(pages))
    }

    /// Add a message created at `created_at` and return its ID.
    pub fn push(&self, created_at: DateTime<Utc>) -> MessageId {
        let id = {
            let mut next = self.next_id.lock();
            let id = MessageId::new(*next);
            *next += 1;
            id
        };
        self.messages.lock().push(Message {
            id,
            channel_id: self.id,
            created_at,
        });
        id
    }

    /// Add `count` messages that are `age` old relative to `now`.
    pub fn push_aged(&self, now: DateTime<Utc>, age: TimeDelta, count: usize) -> Vec<MessageId> {
        (0..count).map(|_| self.push(now - age)).collect()
    }

    /// Messages still present in the channel.
    pub fn remaining(&self) -> Vec<Message> {
        let deleted = self.deleted.lock();
        self.messages
            .lock()
            .iter()
            .filter(|m| !deleted.contains(&m.id))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        !self.deleted.lock().contains(&id) && self.messages.lock().iter().any(|m| m.id == id)
    }

    /// Every delete call issued against this channel, in order.
    pub fn delete_calls(&self) -> Vec<DeleteCall> {
        self.calls.lock().clone()
    }

    /// Sizes of the bulk delete calls, including failed ones.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeleteCall::Batch(ids) => Some(ids.len()),
                DeleteCall::Single(_) => None,
            })
            .collect()
    }

    pub fn single_delete_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, DeleteCall::Single(_)))
            .count()
    }

    pub fn history_pages_served(&self) -> u32 {
        self.history_pages.load(Ordering::SeqCst)
    }

    /// History view including deleted messages: newest first when ordered,
    /// otherwise insertion order.
    fn history_view(&self) -> Vec<Message> {
        let mut view = self.messages.lock().clone();
        if self.descending {
            view.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.id.cmp(&a.id))
            });
        }
        view
    }

    fn remove(&self, ids: impl IntoIterator<Item = MessageId>) {
        self.deleted.lock().extend(ids);
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn guarantees_descending_order(&self) -> bool {
        self.descending
    }

    fn history_page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_history_page(
        &self,
        cursor: HistoryCursor,
        limit: usize,
    ) -> PlatformResult<Vec<Message>> {
        let served = self.history_pages.fetch_add(1, Ordering::SeqCst);
        for failure in &self.failures {
            if let MemoryFailure::FailHistoryAfter(pages) = failure
                && served >= *pages
            {
                return Err(PlatformError::Transport(
                    "injected history failure".to_string(),
                ));
            }
        }

        let view = self.history_view();
        let deleted = self.deleted.lock();
        let live = |m: &Message| !deleted.contains(&m.id);
        let page = match cursor {
            HistoryCursor::NotAfter(bound) => view
                .into_iter()
                .filter(|m| m.created_at <= bound && live(m))
                .take(limit)
                .collect(),
            HistoryCursor::BeforeMessage(id) => {
                let start = view
                    .iter()
                    .position(|m| m.id == id)
                    .map(|pos| pos + 1)
                    .unwrap_or(view.len());
                view.into_iter()
                    .skip(start)
                    .filter(|m| live(m))
                    .take(limit)
                    .collect()
            }
        };
        Ok(page)
    }

    async fn delete_messages(&self, messages: &[Message]) -> PlatformResult<()> {
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        self.calls.lock().push(DeleteCall::Batch(ids.clone()));
        let call_number = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if messages.is_empty() || messages.len() > MAX_BULK_DELETE {
            return Err(PlatformError::InvalidRequest(format!(
                "bulk delete accepts 1 to {MAX_BULK_DELETE} messages, got {}",
                messages.len()
            )));
        }

        for failure in &self.failures {
            if let MemoryFailure::FailBatchCall(n) = failure
                && *n == call_number
            {
                return Err(PlatformError::Http {
                    status: 500,
                    message: format!("injected failure on bulk delete call {call_number}"),
                });
            }
        }

        self.remove(ids);
        Ok(())
    }

    async fn delete_message(&self, message: &Message) -> PlatformResult<()> {
        self.calls.lock().push(DeleteCall::Single(message.id));

        for failure in &self.failures {
            if let MemoryFailure::FailSingle(ids) = failure
                && ids.contains(&message.id)
            {
                return Err(PlatformError::Forbidden);
            }
        }

        if !self.contains(message.id) {
            return Err(PlatformError::NotFound);
        }

        self.remove([message.id]);
        Ok(())
    }
}

/// A set of in-memory channels addressable by ID.
#[derive(Default)]
pub struct MemoryPlatform {
    channels: RwLock<HashMap<ChannelId, Arc<MemoryChannel>>>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, replacing any previous channel with the same ID.
    pub fn add_channel(&self, channel: MemoryChannel) -> Arc<MemoryChannel> {
        let channel = Arc::new(channel);
        self.channels.write().insert(channel.id, channel.clone());
        channel
    }

    /// Register empty channels for each ID.
    pub fn with_empty_channels(ids: impl IntoIterator<Item = ChannelId>) -> Self {
        let platform = Self::new();
        for id in ids {
            platform.add_channel(MemoryChannel::new(id));
        }
        platform
    }

    pub fn channel(&self, id: ChannelId) -> Option<Arc<MemoryChannel>> {
        self.channels.read().get(&id).cloned()
    }
}

#[async_trait]
impl ChatClient for MemoryPlatform {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn resolve_channel(&self, id: ChannelId) -> PlatformResult<Arc<dyn Channel>> {
        self.channel(id)
            .map(|c| c as Arc<dyn Channel>)
            .ok_or(PlatformError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(channel: &MemoryChannel, id: MessageId) -> Message {
        channel
            .remaining()
            .into_iter()
            .find(|m| m.id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_batch_delete_removes_messages() {
        let now = Utc::now();
        let channel = MemoryChannel::new(ChannelId::new(1));
        let ids = channel.push_aged(now, TimeDelta::days(9), 3);
        let batch: Vec<Message> = ids[..2].iter().map(|id| message(&channel, *id)).collect();

        channel.delete_messages(&batch).await.unwrap();

        assert_eq!(channel.remaining().len(), 1);
        assert_eq!(channel.delete_calls(), vec![DeleteCall::Batch(ids[..2].to_vec())]);
    }

    #[tokio::test]
    async fn test_bulk_delete_size_limit_ignores_page_size() {
        let now = Utc::now();
        let channel = MemoryChannel::new(ChannelId::new(1)).with_page_size(10);
        let ids = channel.push_aged(now, TimeDelta::days(9), MAX_BULK_DELETE + 1);
        let all: Vec<Message> = channel.remaining();

        assert!(matches!(
            channel.delete_messages(&all).await,
            Err(PlatformError::InvalidRequest(_))
        ));
        assert_eq!(channel.remaining().len(), MAX_BULK_DELETE + 1);

        let full: Vec<Message> = ids[..MAX_BULK_DELETE]
            .iter()
            .map(|id| message(&channel, *id))
            .collect();
        assert!(channel.delete_messages(&full).await.is_ok());
        assert_eq!(channel.remaining().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_batch_failure_keeps_messages() {
        let now = Utc::now();
        let channel = MemoryChannel::new(ChannelId::new(1)).with_batch_failure(1);
        let ids = channel.push_aged(now, TimeDelta::days(9), 2);
        let batch: Vec<Message> = ids.iter().map(|id| message(&channel, *id)).collect();

        assert!(channel.delete_messages(&batch).await.is_err());
        assert_eq!(channel.remaining().len(), 2);
        assert!(channel.delete_messages(&batch).await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_single_failure() {
        let now = Utc::now();
        // IDs are assigned sequentially from 1.
        let channel = MemoryChannel::new(ChannelId::new(1))
            .with_failure(MemoryFailure::FailSingle(HashSet::from([MessageId::new(1)])));
        let ids = channel.push_aged(now, TimeDelta::days(20), 2);

        let first = message(&channel, ids[0]);
        let second = message(&channel, ids[1]);
        assert_eq!(
            channel.delete_message(&first).await,
            Err(PlatformError::Forbidden)
        );
        assert!(channel.delete_message(&second).await.is_ok());
        assert_eq!(
            channel.delete_message(&second).await,
            Err(PlatformError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_unordered_history_keeps_insertion_order() {
        let now = Utc::now();
        let channel = MemoryChannel::new(ChannelId::new(1)).with_unordered_history();
        let young = channel.push(now - TimeDelta::days(8));
        let old = channel.push(now - TimeDelta::days(30));

        let page = channel
            .fetch_history_page(HistoryCursor::NotAfter(now), 10)
            .await
            .unwrap();
        assert!(!channel.guarantees_descending_order());
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![young, old]);
    }

    #[tokio::test]
    async fn test_resolve_unknown_channel() {
        let platform = MemoryPlatform::with_empty_channels([ChannelId::new(1)]);
        assert!(platform.resolve_channel(ChannelId::new(1)).await.is_ok());
        assert_eq!(
            platform.resolve_channel(ChannelId::new(2)).await.err(),
            Some(PlatformError::NotFound)
        );
    }
}
