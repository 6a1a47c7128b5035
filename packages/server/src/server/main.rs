// Main entry point for the crisis-monitoring server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::domains::monitoring::pipeline::{CrisisMonitor, MonitorConfig};
use server_core::domains::monitoring::rules::{
    default_rules, RuleEngine, RuleThresholds, VolumeBaseline,
};
use server_core::domains::monitoring::store::{EventStore, PostgresEventStorage};
use server_core::kernel::broadcast::BroadcastHub;
use server_core::kernel::scheduled_tasks::start_scheduler;
use server_core::kernel::traits::{BaseListeningSource, LogNotificationDispatcher};
use server_core::kernel::ServerDeps;
use server_core::server::build_app;
use server_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting crisis-monitoring server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Wire dependencies. Poll sources are registered by the embedding
    // product; a bare deployment still serves the push path and streams.
    let store = Arc::new(EventStore::new(Arc::new(PostgresEventStorage::new(pool))));
    let hub = BroadcastHub::new();
    let sources: Vec<Arc<dyn BaseListeningSource>> = Vec::new();
    let notifier = Arc::new(LogNotificationDispatcher);
    let deps = ServerDeps::new(store, hub, sources, notifier);

    let baseline = VolumeBaseline::new();
    let engine = RuleEngine::new(
        default_rules(&RuleThresholds::default(), baseline.clone()),
        baseline,
    );
    let monitor_config = MonitorConfig {
        poll_interval: Duration::from_secs(config.poll_interval_secs),
        retention_days: config.retention_days,
        ..MonitorConfig::default()
    };
    let monitor = Arc::new(CrisisMonitor::new(deps, engine, monitor_config));

    monitor.start().await.context("Failed to start monitor")?;
    let _scheduler = start_scheduler(monitor.clone())
        .await
        .context("Failed to start scheduled tasks")?;

    // Start server
    let app = build_app(monitor.clone());
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);
    tracing::info!(
        "Event streams: http://localhost:{}/api/streams/events.all",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("Server exited with error")?;

    monitor.stop().await;
    Ok(())
}
