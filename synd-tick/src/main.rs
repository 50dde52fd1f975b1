//! synd-tick - scheduler driver for the publishing engine
//!
//! Fires due posts and keeps active campaigns stocked. Intended to be run
//! on a fixed cadence, either as a long-lived daemon polling on an
//! interval or as a one-shot (`--once`) invocation from an external timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::time::sleep;
use tracing::{error, info};

use libsyndicate::campaigns::CampaignScheduler;
use libsyndicate::content::{ContentGenerator, HttpContentGenerator};
use libsyndicate::platforms::AdapterRegistry;
use libsyndicate::tokens::{HttpRefresher, TokenBroker};
use libsyndicate::vault::AgeVault;
use libsyndicate::{Config, Database, Publisher, Result, SyndicateError, TickRunner};

#[derive(Parser, Debug)]
#[command(name = "synd-tick")]
#[command(version)]
#[command(about = "Scheduler driver: publish due posts and replenish campaigns")]
#[command(long_about = "\
synd-tick - scheduler driver for the syndicate publishing engine

DESCRIPTION:
    Each tick selects due posts (bounded batch), publishes them through
    the per-platform adapters with failure isolation, then checks every
    active campaign for low content inventory and requests fresh posts
    from the configured generator.

USAGE:
    # Run as a polling daemon (default 60s interval)
    synd-tick

    # One tick, print the JSON tally, exit (for external cron/timers)
    synd-tick --once

SIGNALS:
    SIGTERM, SIGINT - graceful shutdown (finishes the current tick)

CONFIGURATION:
    Config file: ~/.config/syndicate/config.toml (or $SYNDICATE_CONFIG)
    Vault passphrase: $SYNDICATE_VAULT_PASSPHRASE, [vault] passphrase,
    or [vault] passphrase_file

EXIT CODES:
    0 - clean shutdown
    1 - runtime error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run one tick, print the tally as JSON, and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load()?;
    let runner = build_runner(&config).await?;

    if cli.once {
        let tally = runner.run_tick().await?;
        let json = serde_json::to_string(&tally)
            .map_err(|e| SyndicateError::InvalidInput(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    info!("synd-tick daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.driver.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    run_daemon_loop(&runner, poll_interval, shutdown).await;

    info!("synd-tick daemon stopped");
    Ok(())
}

/// Wire the engine from configuration.
async fn build_runner(config: &Config) -> Result<TickRunner> {
    let db = Database::new(&config.database.path).await?;

    let vault = Arc::new(AgeVault::new(config.vault.resolve_passphrase()?)?);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| SyndicateError::InvalidInput(format!("http client: {}", e)))?;

    let refresher = Arc::new(HttpRefresher::new(http.clone(), config.oauth.clone()));
    let broker = TokenBroker::new(db.clone(), vault, refresher);
    let adapters = Arc::new(AdapterRegistry::standard(&http));
    let publisher = Publisher::new(db.clone(), broker, adapters);

    let generator: Option<Arc<dyn ContentGenerator>> = config.generator.as_ref().map(|g| {
        Arc::new(HttpContentGenerator::new(
            http.clone(),
            g.endpoint.clone(),
            g.timeout_secs,
        )) as Arc<dyn ContentGenerator>
    });
    if generator.is_none() {
        info!("no generator endpoint configured; campaign replenishment disabled");
    }
    let campaigns = CampaignScheduler::new(db.clone(), generator);

    Ok(TickRunner::new(
        db,
        publisher,
        campaigns,
        config.driver.publish_batch_size,
        config.driver.stuck_publishing_minutes * 60,
    ))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| SyndicateError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

/// Main daemon loop. A failed tick is logged and retried next cadence; it
/// never takes the daemon down.
async fn run_daemon_loop(runner: &TickRunner, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        match runner.run_tick().await {
            Ok(tally) => {
                if tally.due > 0 || tally.campaigns_replenished > 0 || tally.reclaimed > 0 {
                    info!(
                        published = tally.published,
                        failed = tally.failed,
                        replenished = tally.campaigns_replenished,
                        "tick summary"
                    );
                }
            }
            Err(e) => error!("tick abandoned: {}", e),
        }

        // Sleep until next poll, checking for shutdown every second
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
