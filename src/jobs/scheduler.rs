//! Sweep scheduler with single-flight triggers.
//!
//! Two things can start a cleanup pass: the periodic timer and a manual
//! trigger (signal or one-shot CLI invocation). Passes never overlap:
//! - a scheduled tick that finds a pass in flight is skipped
//! - a manual trigger waits and runs right after the pass in flight

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ScheduleConfig, SweeperConfig},
    observability::metrics,
    platform::{ChannelId, ChatClient, PlatformError, build_client, dry_run::DryRunClient},
    retention::{CleanupReport, PolicyError, RetentionPolicy, run_sweep},
};

/// What asked for a cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("a sweep is already in progress; {0} trigger skipped")]
    Overlap(TriggerSource),
}

/// Errors building a scheduler from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid retention policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Failed to create platform client: {0}")]
    Platform(#[from] PlatformError),
}

/// Counters kept across passes.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub completed_runs: u64,
    pub skipped_triggers: u64,
    pub total_deleted: u64,
    pub last_report: Option<CleanupReport>,
}

struct SchedulerInner {
    client: Arc<dyn ChatClient>,
    channels: Vec<ChannelId>,
    policy: RetentionPolicy,
    dry_run: bool,
    run_lock: tokio::sync::Mutex<()>,
    running: AtomicBool,
    stats: parking_lot::Mutex<SchedulerStats>,
}

/// Marks a pass as in flight until dropped, including when the trigger
/// future is cancelled mid-pass.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs cleanup passes on request, one at a time.
#[derive(Clone)]
pub struct SweepScheduler {
    inner: Arc<SchedulerInner>,
}

impl SweepScheduler {
    pub fn new(
        client: Arc<dyn ChatClient>,
        channels: Vec<ChannelId>,
        policy: RetentionPolicy,
    ) -> Self {
        Self::build(client, channels, policy, false)
    }

    /// A scheduler whose passes read history but never delete.
    pub fn dry_run(
        client: Arc<dyn ChatClient>,
        channels: Vec<ChannelId>,
        policy: RetentionPolicy,
    ) -> Self {
        let client: Arc<dyn ChatClient> = Arc::new(DryRunClient::new(client));
        Self::build(client, channels, policy, true)
    }

    /// Build the scheduler described by a loaded configuration.
    pub fn from_config(config: &SweeperConfig) -> Result<Self, SchedulerError> {
        let policy = config.retention.policy()?;
        let client = build_client(&config.platform, &config.channels)?;
        let channels = config.channels.clone();

        Ok(if config.retention.dry_run {
            Self::dry_run(client, channels, policy)
        } else {
            Self::new(client, channels, policy)
        })
    }

    fn build(
        client: Arc<dyn ChatClient>,
        channels: Vec<ChannelId>,
        policy: RetentionPolicy,
        dry_run: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                client,
                channels,
                policy,
                dry_run,
                run_lock: tokio::sync::Mutex::new(()),
                running: AtomicBool::new(false),
                stats: parking_lot::Mutex::new(SchedulerStats::default()),
            }),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.inner.dry_run
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.inner.channels
    }

    /// Whether a pass is in flight right now. Never touches the run lock.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.stats.lock().clone()
    }

    /// Run a cleanup pass unless the trigger must be skipped.
    ///
    /// Scheduled triggers fail with [`TriggerError::Overlap`] while another
    /// pass is in flight. Manual triggers wait for it instead.
    pub async fn trigger(&self, source: TriggerSource) -> Result<CleanupReport, TriggerError> {
        let _guard = match source {
            TriggerSource::Scheduled => match self.inner.run_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    self.inner.stats.lock().skipped_triggers += 1;
                    metrics::record_trigger_overlap(source.as_str());
                    return Err(TriggerError::Overlap(source));
                }
            },
            TriggerSource::Manual => match self.inner.run_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::info!("Manual sweep queued behind the sweep in progress");
                    self.inner.run_lock.lock().await
                }
            },
        };
        let _running = RunningFlag::set(&self.inner.running);

        let started = Instant::now();
        let mut report = run_sweep(
            self.inner.client.as_ref(),
            &self.inner.channels,
            &self.inner.policy,
        )
        .await;
        report.dry_run = self.inner.dry_run;

        metrics::record_sweep_run(
            source.as_str(),
            started.elapsed().as_secs_f64(),
            report.total_deleted,
        );

        {
            let mut stats = self.inner.stats.lock();
            stats.completed_runs += 1;
            stats.total_deleted += report.total_deleted;
            stats.last_report = Some(report.clone());
        }

        Ok(report)
    }
}

/// Starts the periodic sweep worker.
///
/// Runs until `shutdown` is cancelled. A pass in flight when shutdown is
/// requested is allowed to finish.
pub async fn start_sweep_worker(
    scheduler: SweepScheduler,
    config: ScheduleConfig,
    shutdown: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Periodic sweeps disabled by configuration");
        return;
    }

    let dry_run_msg = if scheduler.is_dry_run() {
        " (DRY RUN)"
    } else {
        ""
    };

    tracing::info!(
        interval_minutes = config.interval_minutes,
        run_on_start = config.run_on_start,
        channels = scheduler.channels().len(),
        dry_run = scheduler.is_dry_run(),
        "Starting sweep worker{}",
        dry_run_msg
    );

    let period = config.interval();
    let mut ticker = if config.run_on_start {
        tokio::time::interval(period)
    } else {
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Sweep worker shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        match scheduler.trigger(TriggerSource::Scheduled).await {
            Ok(report) => {
                if report.has_deletions() {
                    tracing::info!(
                        total = report.total_deleted,
                        failed_channels = report.failed_channels().count(),
                        duration_ms = report.duration_ms,
                        "Scheduled sweep complete{}",
                        dry_run_msg
                    );
                } else {
                    tracing::debug!("Scheduled sweep complete, no messages to delete");
                }
            }
            Err(e) => {
                tracing::info!(error = %e, "Skipping scheduled sweep");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::platform::memory::{MemoryChannel, MemoryPlatform};

    fn policy(pacing: Duration) -> RetentionPolicy {
        RetentionPolicy::new(TimeDelta::days(7), TimeDelta::days(14), 100, pacing).unwrap()
    }

    fn platform_with_old_messages(count: usize) -> (Arc<MemoryPlatform>, Arc<MemoryChannel>) {
        let platform = Arc::new(MemoryPlatform::new());
        let channel = platform.add_channel(MemoryChannel::new(ChannelId::new(1)));
        channel.push_aged(Utc::now(), TimeDelta::days(30), count);
        (platform, channel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_trigger_skips_while_running() {
        let (platform, _channel) = platform_with_old_messages(3);
        let scheduler = SweepScheduler::new(
            platform,
            vec![ChannelId::new(1)],
            policy(Duration::from_secs(1)),
        );

        let running = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger(TriggerSource::Manual).await })
        };
        // Let the manual pass start and reach its first pacing sleep.
        tokio::task::yield_now().await;
        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            scheduler.trigger(TriggerSource::Scheduled).await.unwrap_err(),
            TriggerError::Overlap(TriggerSource::Scheduled)
        );

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.total_deleted, 3);

        let stats = scheduler.stats();
        assert_eq!(stats.completed_runs, 1);
        assert_eq!(stats.skipped_triggers, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_polling_is_running_never_skips_a_scheduled_trigger() {
        let (platform, _channel) = platform_with_old_messages(0);
        let scheduler =
            SweepScheduler::new(platform, vec![ChannelId::new(1)], policy(Duration::ZERO));
        assert!(!scheduler.is_running());

        let stop = Arc::new(AtomicBool::new(false));
        let poller = {
            let scheduler = scheduler.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let _ = scheduler.is_running();
                }
            })
        };

        for _ in 0..200 {
            scheduler.trigger(TriggerSource::Scheduled).await.unwrap();
        }
        stop.store(true, Ordering::SeqCst);
        poller.join().unwrap();

        assert!(!scheduler.is_running());
        let stats = scheduler.stats();
        assert_eq!(stats.completed_runs, 200);
        assert_eq!(stats.skipped_triggers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_pass_clears_running_flag() {
        let (platform, _channel) = platform_with_old_messages(5);
        let scheduler = SweepScheduler::new(
            platform,
            vec![ChannelId::new(1)],
            policy(Duration::from_secs(1)),
        );

        let pass = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger(TriggerSource::Manual).await })
        };
        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }

        pass.abort();
        assert!(pass.await.unwrap_err().is_cancelled());
        assert!(!scheduler.is_running());

        let report = scheduler.trigger(TriggerSource::Scheduled).await.unwrap();
        assert!(report.total_deleted > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_queues_behind_running_sweep() {
        let (platform, channel) = platform_with_old_messages(2);
        let scheduler = SweepScheduler::new(
            platform,
            vec![ChannelId::new(1)],
            policy(Duration::from_secs(1)),
        );

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger(TriggerSource::Manual).await })
        };
        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }
        let second = scheduler.trigger(TriggerSource::Manual).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first.total_deleted, 2);
        // Queued strictly after the first pass, so nothing is left to delete.
        assert_eq!(second.total_deleted, 0);
        assert_eq!(channel.single_delete_count(), 2);
        assert_eq!(scheduler.stats().completed_runs, 2);
    }

    #[tokio::test]
    async fn test_from_config_honours_dry_run() {
        let config = SweeperConfig::from_str(
            r#"
            channels = [1, 2]

            [retention]
            dry_run = true

            [platform]
            type = "memory"
            "#,
        )
        .unwrap();

        let scheduler = SweepScheduler::from_config(&config).unwrap();
        assert!(scheduler.is_dry_run());
        assert_eq!(scheduler.channels(), &[ChannelId::new(1), ChannelId::new(2)]);

        let report = scheduler.trigger(TriggerSource::Manual).await.unwrap();
        assert!(report.dry_run);
        assert!(report.failed_channels().next().is_none());
    }

    #[tokio::test]
    async fn test_second_immediate_run_deletes_nothing() {
        let (platform, _channel) = platform_with_old_messages(5);
        let scheduler =
            SweepScheduler::new(platform, vec![ChannelId::new(1)], policy(Duration::ZERO));

        let first = scheduler.trigger(TriggerSource::Manual).await.unwrap();
        let second = scheduler.trigger(TriggerSource::Manual).await.unwrap();

        assert_eq!(first.total_deleted, 5);
        assert_eq!(second.total_deleted, 0);
        assert_eq!(scheduler.stats().total_deleted, 5);
    }

    #[tokio::test]
    async fn test_dry_run_scheduler_reports_without_deleting() {
        let (platform, channel) = platform_with_old_messages(4);
        let scheduler =
            SweepScheduler::dry_run(platform, vec![ChannelId::new(1)], policy(Duration::ZERO));

        let report = scheduler.trigger(TriggerSource::Manual).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.total_deleted, 4);
        assert_eq!(channel.remaining().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_runs_on_interval_until_cancelled() {
        let (platform, _channel) = platform_with_old_messages(1);
        let scheduler =
            SweepScheduler::new(platform, vec![ChannelId::new(1)], policy(Duration::ZERO));
        let shutdown = CancellationToken::new();
        let config = ScheduleConfig {
            enabled: true,
            interval_minutes: 10,
            run_on_start: true,
        };

        let worker = tokio::spawn(start_sweep_worker(
            scheduler.clone(),
            config,
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(25 * 60)).await;
        shutdown.cancel();
        worker.await.unwrap();

        // Ticks at 0, 10 and 20 minutes.
        assert_eq!(scheduler.stats().completed_runs, 3);
    }

    #[tokio::test]
    async fn test_disabled_worker_returns_immediately() {
        let (platform, _channel) = platform_with_old_messages(1);
        let scheduler =
            SweepScheduler::new(platform, vec![ChannelId::new(1)], policy(Duration::ZERO));
        let config = ScheduleConfig {
            enabled: false,
            ..Default::default()
        };

        start_sweep_worker(scheduler.clone(), config, CancellationToken::new()).await;
        assert_eq!(scheduler.stats().completed_runs, 0);
    }
}
