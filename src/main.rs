//! chobo: the LINE bookkeeping assistant server.
//!
//! This is the application entry point. It loads configuration, initializes
//! tracing, opens the store, builds the outbound service clients, spawns the
//! message workers and the scheduler, and serves the webhook until SIGINT or
//! SIGTERM. Queued messages are drained before exit.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chobo::accounting::AccountingEngine;
use chobo::config::{AppConfig, DEBUG_LOG_FILTER, DEFAULT_LOG_FILTER, SHUTDOWN_GRACE_SECS};
use chobo::http::{shutdown_signal, start_server};
use chobo::jobs::{spawn_workers, JobQueue, MessageProcessor, Scheduler};
use chobo::services::analyzer::analyzer_from_config;
use chobo::services::line::{LineClient, Messenger};
use chobo::services::ocr::ocr_from_config;
use chobo::services::speech::speech_from_config;
use chobo::{create_router, store, AppState};

/// chobo: bookkeeping over LINE for sole proprietors
#[derive(Parser, Debug)]
#[command(name = "chobo", version, about)]
struct Args {
    /// Path to configuration file (defaults to config/default.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "chobo=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(cli_filter: Option<String>, config: &AppConfig) {
    // Priority: CLI > env > DEBUG setting > default
    let log_filter = cli_filter
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| {
            if config.app.debug {
                DEBUG_LOG_FILTER.to_string()
            } else {
                DEFAULT_LOG_FILTER.to_string()
            }
        });

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = AppConfig::load_with_env(args.config.as_deref())?;
    init_tracing(args.log_level, &config);

    tracing::info!(
        name = %config.app.name,
        debug = config.app.debug,
        workers = config.worker.count,
        "Loaded configuration"
    );
    if config.line.channel_secret.is_none() {
        tracing::warn!("LINE channel secret not configured, webhook requests will be rejected");
    }

    let store = store::open(&config.database).await?;
    let engine = AccountingEngine::new(store.clone());
    let messenger: Arc<dyn Messenger> = Arc::new(LineClient::new(&config.line)?);
    let analyzer = analyzer_from_config(&config.claude)?;
    tracing::info!(analyzer = analyzer.name(), "Transaction analyzer ready");
    let tz = config.scheduler.tz()?;

    let processor = MessageProcessor::new(engine.clone(), analyzer, messenger.clone(), tz)
        .with_ocr(ocr_from_config(&config.ocr)?)
        .with_speech(speech_from_config(&config.speech)?);

    let queue = JobQueue::new(config.worker.queue_capacity);
    let workers = spawn_workers(config.worker.count, queue.receiver(), Arc::new(processor));

    let scheduler = if config.scheduler.enabled {
        Some(tokio::spawn(Scheduler::new(engine, messenger, tz).run()))
    } else {
        tracing::info!("Scheduler disabled");
        None
    };

    let http_config = config.http.clone();
    let state = AppState::new(config, store, queue.clone());
    start_server(create_router(state), &http_config, shutdown_signal()).await?;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    queue.close();
    tracing::info!(pending = queue.len(), "Draining message queue");
    let drain = futures::future::join_all(workers);
    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), drain)
        .await
        .is_err()
    {
        tracing::warn!(
            pending = queue.len(),
            "Shutdown grace period elapsed with messages still queued"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
