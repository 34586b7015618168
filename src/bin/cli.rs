//! girsync CLI
//!
//! Local execution entry point for the availability sync engine.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use girsync::{
    error::{AppError, Result},
    models::{Config, DepartureStatus, FetchedAvailability},
    pipeline::{self, Scheduler, SyncContext},
    services::{LogDelivery, NotificationDispatcher, SourceFetcher},
    storage::LocalStore,
};

/// girsync - Guaranteed-departure availability watcher
#[derive(Parser, Debug)]
#[command(
    name = "girsync",
    version,
    about = "Synchronizes guaranteed-departure availability and dispatches watchlist alerts"
)]
struct Cli {
    /// Path to storage directory containing config and data files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler loop until interrupted
    Run,

    /// Trigger a manual sync for one source and print the outcome
    Sync {
        /// Source identifier
        #[arg(long)]
        source: String,
    },

    /// Record an operator-entered availability for a manual source
    Reading {
        /// Source identifier
        #[arg(long)]
        source: String,

        /// Available seats observed
        #[arg(long)]
        available: Option<u32>,

        /// Total seats observed
        #[arg(long)]
        total: Option<u32>,

        /// Status observed (open, closed, full, cancelled)
        #[arg(long)]
        status: Option<String>,

        /// Price observed, in currency minor units
        #[arg(long)]
        price_cents: Option<i64>,

        /// Next departure date observed (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Record an internal booking against a departure
    Booking {
        /// Departure identifier
        #[arg(long)]
        departure: String,

        /// Seats booked (negative to release)
        #[arg(long)]
        seats: i64,
    },

    /// Validate configuration and source definitions
    Validate,

    /// Show sources and their last sync outcomes
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn parse_status(text: &str) -> Result<DepartureStatus> {
    match text {
        "open" => Ok(DepartureStatus::Open),
        "closed" => Ok(DepartureStatus::Closed),
        "full" => Ok(DepartureStatus::Full),
        "cancelled" => Ok(DepartureStatus::Cancelled),
        other => Err(AppError::config(format!("unknown status: {other}"))),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Arc::new(Config::load_or_default(&config_path));

    let store = Arc::new(LocalStore::new(&cli.storage_dir));
    let ctx = SyncContext {
        fetcher: SourceFetcher::new(&config.fetcher)?,
        dispatcher: Arc::new(NotificationDispatcher::new(&config.dispatcher)),
        delivery: Arc::new(LogDelivery),
        store: store.clone(),
        config: config.clone(),
    };

    match cli.command {
        Command::Run => {
            log::info!("girsync starting from {}", cli.storage_dir.display());

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let scheduler = Scheduler::new(ctx);
            let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

            tokio::signal::ctrl_c().await?;
            log::info!("shutdown requested; letting in-flight syncs finish");
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                log::error!("scheduler task failed: {e}");
            }
        }

        Command::Sync { source } => {
            let outcome = pipeline::trigger_manual_sync(&ctx, &source).await?;
            if outcome.is_success() {
                log::info!(
                    "sync ok: {} event(s), {} notification(s)",
                    outcome.events_emitted,
                    outcome.intents_delivered
                );
            } else {
                log::error!(
                    "sync failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Command::Reading {
            source,
            available,
            total,
            status,
            price_cents,
            date,
        } => {
            let fetched = FetchedAvailability {
                available_seats: available,
                total_seats: total,
                status: status.as_deref().map(parse_status).transpose()?,
                price_cents,
                next_departure_date: date,
            };
            if fetched.is_empty() {
                return Err(AppError::config("a reading needs at least one value"));
            }

            let outcome = pipeline::apply_manual_reading(&ctx, &source, &fetched).await?;
            if outcome.is_success() {
                log::info!("reading recorded: {} event(s)", outcome.events_emitted);
            } else {
                log::error!(
                    "reading rejected: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Command::Booking { departure, seats } => {
            pipeline::on_internal_booking(&ctx, &departure, seats).await?;
            log::info!("booking recorded on {departure} ({seats:+} seat(s))");
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            config.validate()?;
            log::info!("✓ Config OK");

            let sources = store.load_all_sources().await?;
            for source in &sources {
                source.validate()?;
            }
            log::info!("✓ {} source(s) OK", sources.len());

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());

            let circuits = store.load_circuits().await?;
            let subscriptions = store.load_all_subscriptions().await?;
            log::info!(
                "{} circuit(s), {} subscription(s)",
                circuits.len(),
                subscriptions.len()
            );

            let sources = store.load_all_sources().await?;
            if sources.is_empty() {
                log::info!("No sources configured yet.");
            }
            for source in sources {
                let last = source
                    .last_sync_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                let status = match source.last_sync_status {
                    Some(s) => format!("{s:?}").to_lowercase(),
                    None => "-".to_string(),
                };
                log::info!(
                    "{} [{}] circuit={} last_sync={} status={}{}",
                    source.id,
                    if source.active { "active" } else { "inactive" },
                    source.circuit_id,
                    last,
                    status,
                    source
                        .last_sync_error
                        .as_deref()
                        .map(|e| format!(" error={e}"))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
