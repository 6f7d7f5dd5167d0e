use chrono::{DateTime, Utc};

use super::{CleanupReport, RetentionPolicy, SweepError, SweepResult, sweep_channel};
use crate::{
    observability::metrics,
    platform::{ChannelId, ChatClient},
};

/// Run one cleanup pass over `channel_ids`, in order.
///
/// Every channel in the pass is judged against the same reference time. A
/// channel that cannot be resolved or fails partway is recorded in the
/// report; the pass always continues to the next channel.
///
/// Callers must not run two passes concurrently against the same channels;
/// see [`crate::jobs::SweepScheduler`].
pub async fn run_sweep(
    client: &dyn ChatClient,
    channel_ids: &[ChannelId],
    policy: &RetentionPolicy,
) -> CleanupReport {
    run_sweep_at(client, channel_ids, policy, Utc::now()).await
}

/// [`run_sweep`] with an explicit reference time.
pub async fn run_sweep_at(
    client: &dyn ChatClient,
    channel_ids: &[ChannelId],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> CleanupReport {
    let started = tokio::time::Instant::now();
    let mut results = Vec::with_capacity(channel_ids.len());

    tracing::info!(
        platform = client.name(),
        channels = channel_ids.len(),
        policy = %policy,
        "Starting cleanup pass"
    );

    for &channel_id in channel_ids {
        let result = match client.resolve_channel(channel_id).await {
            Ok(channel) => sweep_channel(channel.as_ref(), policy, now).await,
            Err(e) => {
                let failure = SweepError::from_resolve(e);
                tracing::warn!(channel_id = %channel_id, error = %failure, "Could not resolve channel");
                SweepResult::failed(channel_id, failure)
            }
        };

        log_channel_result(&result);
        if let Some(failure) = &result.failure {
            metrics::record_channel_failure(failure.kind());
        }
        results.push(result);
    }

    let report = CleanupReport::new(now, results, started.elapsed().as_millis() as u64);

    tracing::info!(
        run_id = %report.run_id,
        total_deleted = report.total_deleted,
        channels = report.results.len(),
        failed_channels = report.failed_channels().count(),
        duration_ms = report.duration_ms,
        "Cleanup pass complete"
    );

    report
}

fn log_channel_result(result: &SweepResult) {
    match &result.failure {
        None => tracing::info!(
            channel_id = %result.channel_id,
            deleted = result.deleted(),
            bulk = result.bulk_deleted,
            individual = result.individually_deleted,
            individual_failures = result.individual_failures,
            "Channel sweep complete"
        ),
        Some(SweepError::ChannelNotFound) => {}
        Some(failure) => tracing::warn!(
            channel_id = %result.channel_id,
            deleted = result.deleted(),
            bulk = result.bulk_deleted,
            individual = result.individually_deleted,
            error = %failure,
            "Channel sweep stopped early"
        ),
    }
}
