use thiserror::Error;

use crate::platform::{MessageId, PlatformError};

/// Why a channel's sweep stopped early, or a single delete was skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SweepError {
    /// The channel does not exist or the bot cannot see it.
    #[error("channel not found")]
    ChannelNotFound,

    /// Resolving the channel failed for another reason.
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(#[source] PlatformError),

    /// A bulk delete call failed. Its messages are not retried and the rest
    /// of the channel is abandoned.
    #[error("bulk delete of {count} messages failed: {source}")]
    BatchDeleteFailed {
        count: usize,
        #[source]
        source: PlatformError,
    },

    /// A single delete failed. The message is skipped and the sweep continues.
    #[error("delete of message {message_id} failed: {source}")]
    IndividualDeleteFailed {
        message_id: MessageId,
        #[source]
        source: PlatformError,
    },

    /// Paging through history failed partway.
    #[error("history fetch failed: {0}")]
    HistoryFetchFailed(#[source] PlatformError),
}

impl SweepError {
    /// Short, stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChannelNotFound => "channel_not_found",
            Self::ChannelUnavailable(_) => "channel_unavailable",
            Self::BatchDeleteFailed { .. } => "batch_delete_failed",
            Self::IndividualDeleteFailed { .. } => "individual_delete_failed",
            Self::HistoryFetchFailed(_) => "history_fetch_failed",
        }
    }

    /// Map a channel lookup failure. Missing and inaccessible channels look
    /// the same to the sweep.
    pub(crate) fn from_resolve(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound | PlatformError::Forbidden => Self::ChannelNotFound,
            other => Self::ChannelUnavailable(other),
        }
    }
}
