use chrono::{DateTime, Utc};
use futures::StreamExt;

use super::{BatchAccumulator, Classification, RetentionPolicy, SweepError, SweepResult, classify};
use crate::{
    observability::metrics,
    platform::{self, Channel},
};

/// Sweep one channel: walk its history newest first, bulk delete what the
/// platform allows, delete older messages one at a time, and report.
///
/// Calls against the channel are strictly sequential and follow history
/// order. On a channel with descending history the buffered batch is flushed
/// as soon as the first message too old for bulk deletion shows up. After
/// every single delete and every flushed batch followed by more calls the
/// sweep sleeps for the policy's pacing delay; the final flush is not paced.
///
/// A failed batch abandons the rest of the channel. A failed single delete is
/// counted and skipped. Either way the returned result carries everything
/// deleted up to that point.
pub async fn sweep_channel(
    channel: &dyn Channel,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> SweepResult {
    let channel_id = channel.id();
    let stop_on_keep = channel.guarantees_descending_order();
    let mut result = SweepResult::new(channel_id);
    let mut batch = BatchAccumulator::new(policy.batch_capacity());
    let mut history = platform::history(channel, policy.history_cutoff(now));

    tracing::debug!(
        channel_id = %channel_id,
        cutoff = %policy.history_cutoff(now),
        "Sweeping channel"
    );

    while let Some(next) = history.next().await {
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(channel_id = %channel_id, error = %e, "History fetch failed");
                result.failure = Some(SweepError::HistoryFetchFailed(e));
                break;
            }
        };

        match classify(now, message.created_at, policy) {
            Classification::Keep => {
                result.kept += 1;
                if stop_on_keep {
                    break;
                }
            }
            Classification::BulkEligible => match batch.add(message, channel).await {
                Ok(0) => {}
                Ok(flushed) => {
                    result.record_batch(flushed);
                    metrics::record_retention_deletion("bulk", flushed as u64);
                    pace(policy).await;
                }
                Err(e) => {
                    tracing::warn!(channel_id = %channel_id, error = %e, "Abandoning channel after failed bulk delete");
                    result.failure = Some(e);
                    return result;
                }
            },
            Classification::IndividualOnly => {
                // Nothing bulk-eligible follows in descending history.
                if stop_on_keep {
                    match batch.flush(channel).await {
                        Ok(0) => {}
                        Ok(flushed) => {
                            result.record_batch(flushed);
                            metrics::record_retention_deletion("bulk", flushed as u64);
                            pace(policy).await;
                        }
                        Err(e) => {
                            tracing::warn!(channel_id = %channel_id, error = %e, "Abandoning channel after failed bulk delete");
                            result.failure = Some(e);
                            return result;
                        }
                    }
                }

                match channel.delete_message(&message).await {
                    Ok(()) => {
                        result.individually_deleted += 1;
                        metrics::record_retention_deletion("individual", 1);
                    }
                    Err(source) => {
                        let err = SweepError::IndividualDeleteFailed {
                            message_id: message.id,
                            source,
                        };
                        tracing::warn!(channel_id = %channel_id, error = %err, "Skipping message");
                        metrics::record_individual_delete_failure();
                        result.individual_failures += 1;
                    }
                }
                pace(policy).await;
            }
        }
    }

    // Buffered messages were classified before any history failure, so they
    // are still flushed.
    match batch.flush(channel).await {
        Ok(0) => {}
        Ok(flushed) => {
            result.record_batch(flushed);
            metrics::record_retention_deletion("bulk", flushed as u64);
        }
        Err(e) => {
            tracing::warn!(channel_id = %channel_id, error = %e, "Final bulk delete failed");
            if result.failure.is_none() {
                result.failure = Some(e);
            }
        }
    }

    result
}

async fn pace(policy: &RetentionPolicy) {
    let delay = policy.pacing_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
