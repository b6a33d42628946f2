// src/main.rs
use anyhow::Context;
use clap::Parser;
use ct_monitor::cert_submitter::{ChainIssuer, PemChainIssuer};
use ct_monitor::cli::Cli;
use ct_monitor::collector::{Collector, Periods, Sinks};
use ct_monitor::config::Config;
use ct_monitor::incident::{FanOutReporter, LogReporter, PostgresReporter, Reporter, WebhookReporter};
use ct_monitor::metrics;
use ct_monitor::storage::{MemoryStorage, PostgresStorage, PrintStorage};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Validate arguments
    cli.validate()?;

    // Load config file, then apply CLI overrides
    let mut config = match &cli.config {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };
    cli.apply(&mut config);

    // Initialize logging
    let log_level = cli.log_level(&config.logging.level);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    tracing::info!("Starting ct-monitor...");

    let log = Arc::new(config.log.resolve().await.context("Failed to set up Log")?);
    tracing::info!(
        "Monitoring {} ({}), Log ID {}, MMD {}s",
        log.name,
        log.url,
        log.log_id,
        log.mmd.num_seconds()
    );

    let periods = Periods {
        get_sth: Duration::from_secs(config.periods.get_sth_secs),
        get_roots: Duration::from_secs(config.periods.get_roots_secs),
        add_chain: Duration::from_secs(config.periods.add_chain_secs),
    };

    let issuer: Option<Arc<dyn ChainIssuer>> = config.submitter.chain_file.as_ref().map(|path| {
        let issuer: Arc<dyn ChainIssuer> =
            Arc::new(PemChainIssuer::new(path, log.temporal_interval));
        issuer
    });

    // Reporters: always log, plus database and webhook when configured
    let mut reporters: Vec<Arc<dyn Reporter>> = vec![Arc::new(LogReporter)];
    if let Some(webhook) = &config.webhook {
        tracing::info!("Webhook incident reporting enabled: {}", webhook.url);
        reporters.push(Arc::new(WebhookReporter::new(webhook.clone())));
    }

    // Initialize database if enabled
    let sinks = if config.database.enabled {
        tracing::info!("Database enabled, connecting to PostgreSQL...");
        let postgres = PostgresStorage::new(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.periods.watch_roots_poll_secs.max(1)),
        )
        .await?;

        // Run migrations
        postgres.migrate().await?;
        tracing::info!("Database initialized and migrated successfully");

        reporters.push(Arc::new(PostgresReporter::new(postgres.pool().clone(), &log.name)));
        let reporter: Arc<dyn Reporter> = Arc::new(FanOutReporter::new(reporters));
        Sinks::from_storage(Arc::new(postgres), reporter)
    } else {
        tracing::info!("Database disabled, printing collected data");
        let memory = Arc::new(MemoryStorage::new());
        Sinks {
            api_calls: Arc::new(PrintStorage),
            sths: Arc::new(PrintStorage),
            roots: memory.clone(),
            roots_reader: Some(memory),
            reporter: Arc::new(FanOutReporter::new(reporters)),
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start metrics exporter if enabled
    let mut metrics_handle = None;
    if config.metrics.enabled {
        metrics::init_metrics().context("Failed to register metrics")?;
        let rx = shutdown_rx.clone();
        metrics_handle = Some(tokio::spawn(metrics::metrics_exporter_task(
            config.metrics.clone(),
            rx,
        )));
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down..."),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        shutdown_tx.send(true).ok();
    });

    let collector = Collector {
        log,
        periods,
        request_timeout: REQUEST_TIMEOUT,
        issuer,
        sinks,
    };
    collector.run(shutdown_rx).await?;

    if let Some(handle) = metrics_handle {
        handle.abort();
        handle.await.ok();
    }

    tracing::info!("ct-monitor stopped");
    Ok(())
}
