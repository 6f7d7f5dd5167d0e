use crate::platform::{Channel, Message};

use super::SweepError;

/// Buffers bulk-eligible messages for one channel and deletes them in
/// batches of at most `capacity`.
///
/// Between calls the buffer never holds more than `capacity - 1` messages.
/// Pacing between flushes is left to the caller.
#[derive(Debug)]
pub struct BatchAccumulator {
    buffer: Vec<Message>,
    capacity: usize,
}

impl BatchAccumulator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffer a message, flushing if the buffer is now full.
    ///
    /// Returns the number of messages deleted by this call: `0` when the
    /// message was only buffered, `capacity` when a full batch was flushed.
    pub async fn add(&mut self, message: Message, channel: &dyn Channel) -> Result<usize, SweepError> {
        self.buffer.push(message);
        if self.buffer.len() >= self.capacity {
            return self.flush(channel).await;
        }
        Ok(0)
    }

    /// Delete everything buffered with a single call.
    ///
    /// An empty buffer makes no call and returns `0`. The buffer is cleared
    /// whether or not the call succeeds; failed batches are not retried.
    pub async fn flush(&mut self, channel: &dyn Channel) -> Result<usize, SweepError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        let count = batch.len();

        channel
            .delete_messages(&batch)
            .await
            .map_err(|source| SweepError::BatchDeleteFailed { count, source })?;

        tracing::debug!(channel_id = %channel.id(), count, "Bulk deleted messages");
        Ok(count)
    }
}
