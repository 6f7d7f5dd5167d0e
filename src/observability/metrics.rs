//! Prometheus metrics for the retention sweeper.
//!
//! Provides metrics for:
//! - Messages deleted, split by bulk and individual deletes
//! - Channels that could not be swept
//! - Sweep run counts, durations and skipped triggers

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::config::MetricsConfig;

/// Initialize the metrics system with the given configuration.
///
/// Starts the scrape endpoint on `config.listen`. Must be called from within
/// a tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install()?;

    tracing::info!(listen = %config.listen, "Prometheus metrics endpoint started");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record messages deleted by a sweep.
///
/// # Arguments
/// * `mode` - How the messages were deleted ("bulk" or "individual")
/// * `count` - The number of messages deleted
pub fn record_retention_deletion(mode: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_messages_deleted_total",
            "mode" => mode.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (mode, count);
    }
}

/// Record an individual delete that failed and was skipped.
pub fn record_individual_delete_failure() {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_individual_delete_failures_total").increment(1);
    }
}

/// Record a channel whose sweep did not complete.
///
/// `reason` is the short failure label, e.g. "channel_not_found" or
/// "batch_delete_failed".
pub fn record_channel_failure(reason: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_channel_failures_total",
            "reason" => reason.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = reason;
    }
}

/// Record a completed cleanup pass.
pub fn record_sweep_run(trigger: &str, duration_secs: f64, deleted: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_sweep_runs_total",
            "trigger" => trigger.to_string()
        )
        .increment(1);
        histogram!(
            "retention_sweep_duration_seconds",
            "trigger" => trigger.to_string()
        )
        .record(duration_secs);
        gauge!("retention_last_sweep_deleted").set(deleted as f64);
        gauge!("retention_last_sweep_timestamp_seconds")
            .set(chrono::Utc::now().timestamp() as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (trigger, duration_secs, deleted);
    }
}

/// Record a trigger that was dropped because a pass was already running.
pub fn record_trigger_overlap(trigger: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_sweep_skipped_total",
            "trigger" => trigger.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = trigger;
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
