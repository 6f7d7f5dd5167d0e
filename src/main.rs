use std::path::{Path, PathBuf};

use clap::Parser;
use retention_sweeper::{
    config::{self, SweeperConfig},
    jobs::{self, SweepScheduler, TriggerSource},
    observability,
};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG_PATH: &str = "retention-sweeper.toml";

/// CLI arguments for the retention sweeper
#[derive(Parser, Debug)]
#[command(version, about = "Deletes chat messages older than a retention threshold", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(
        short,
        long,
        global = true,
        env = "RETENTION_SWEEPER_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the sweeper daemon (default)
    ///
    /// Sweeps on the configured interval. Send SIGUSR1 to request a sweep
    /// immediately.
    Run,
    /// Run a single cleanup pass and exit
    Sweep {
        /// Report what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the config file and print the effective policy
    Check,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to --config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => {
            run_init(output.unwrap_or(args.config), force);
        }
        Some(Command::Check) => {
            run_check(&args.config);
        }
        Some(Command::Sweep { dry_run, json }) => {
            run_sweep_once(&args.config, dry_run, json).await;
        }
        Some(Command::Run) | None => {
            run_daemon(&args.config).await;
        }
    }
}

/// Load and validate the config file, exiting on failure.
fn load_config(config_path: &Path) -> SweeperConfig {
    match SweeperConfig::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            if !config_path.exists() {
                eprintln!("Create one with: retention-sweeper init");
            }
            std::process::exit(1);
        }
    }
}

fn init_logging(config: &SweeperConfig) {
    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_scheduler(config: &SweeperConfig) -> SweepScheduler {
    match SweepScheduler::from_config(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to set up sweeper");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run the long-lived daemon until Ctrl+C or SIGTERM.
async fn run_daemon(config_path: &Path) {
    let config = load_config(config_path);
    init_logging(&config);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        std::process::exit(1);
    }

    let scheduler = build_scheduler(&config);

    tracing::info!(
        config_file = %config_path.display(),
        platform = config.platform.name(),
        channels = config.channels.len(),
        min_age_days = config.retention.min_age_days,
        dry_run = config.retention.dry_run,
        "Retention sweeper starting"
    );

    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(jobs::start_sweep_worker(
        scheduler.clone(),
        config.schedule.clone(),
        shutdown.clone(),
    ));

    #[cfg(unix)]
    let manual = tokio::spawn(listen_for_manual_triggers(
        scheduler.clone(),
        shutdown.clone(),
    ));

    shutdown_signal().await;
    if scheduler.is_running() {
        tracing::info!("Shutdown signal received, waiting for the sweep in progress to finish...");
    } else {
        tracing::info!("Shutdown signal received");
    }
    shutdown.cancel();

    if let Err(e) = worker.await {
        tracing::error!(error = %e, "Sweep worker terminated abnormally");
    }
    #[cfg(unix)]
    if let Err(e) = manual.await {
        tracing::error!(error = %e, "Manual trigger listener terminated abnormally");
    }

    let stats = scheduler.stats();
    tracing::info!(
        completed_runs = stats.completed_runs,
        skipped_triggers = stats.skipped_triggers,
        total_deleted = stats.total_deleted,
        "Retention sweeper stopped"
    );
}

/// Run one pass on every SIGUSR1 until shutdown.
#[cfg(unix)]
async fn listen_for_manual_triggers(scheduler: SweepScheduler, shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Could not install SIGUSR1 handler, manual triggers disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = usr1.recv() => {
                if received.is_none() {
                    break;
                }
            }
        }

        tracing::info!("Manual sweep requested");
        match scheduler.trigger(TriggerSource::Manual).await {
            Ok(report) => {
                for line in report.summary().lines() {
                    tracing::info!("{}", line);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Manual sweep did not run"),
        }
    }
}

/// Run a single pass and print the report.
async fn run_sweep_once(config_path: &Path, dry_run: bool, json: bool) {
    let mut config = load_config(config_path);
    if dry_run {
        config.retention.dry_run = true;
    }
    init_logging(&config);

    let scheduler = build_scheduler(&config);
    let report = match scheduler.trigger(TriggerSource::Manual).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!("{}", report.summary());
    }
}

/// Validate the config and print what a sweep would do.
fn run_check(config_path: &Path) {
    let config = load_config(config_path);

    let policy = match config.retention.policy() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Invalid retention policy: {}", e);
            std::process::exit(1);
        }
    };

    println!("Config OK: {}", config_path.display());
    println!("  Platform: {}", config.platform.name());
    println!("  Policy:   {}", policy);
    println!(
        "  Schedule: {}",
        if config.schedule.enabled {
            format!("every {} minutes", config.schedule.interval_minutes)
        } else {
            "manual only".to_string()
        }
    );
    if config.retention.dry_run {
        println!("  Dry run:  messages will not actually be deleted");
    }
    println!("  Channels:");
    for channel in &config.channels {
        println!("    {}", channel);
    }
}

/// Create a default configuration file.
fn run_init(output_path: PathBuf, force: bool) {
    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    // Create parent directories if needed
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, config::DEFAULT_CONFIG_TEMPLATE) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Add the channel IDs to sweep, set BOT_TOKEN, then run:");
    println!("  retention-sweeper check");
    println!("  retention-sweeper run");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
