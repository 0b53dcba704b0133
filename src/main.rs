use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grievance_desk::config::Config;
use grievance_desk::notifications::{email::SystemEmailService, LogNotifier, Notifier};
use grievance_desk::AppState;

#[derive(Parser, Debug)]
#[command(name = "grievance-desk")]
#[command(author, version, about = "Municipal grievance desk with role-elevation review", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "GRIEVANCE_CONFIG", default_value = "grievance.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long, env = "GRIEVANCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Keep all data in memory; nothing survives a restart
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting grievance-desk v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db = if cli.ephemeral {
        tracing::warn!("Running with an in-memory database; data will not be persisted");
        grievance_desk::db::init_memory().await?
    } else {
        std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                config.server.data_dir.display()
            )
        })?;
        grievance_desk::db::init(&config.server.data_dir).await?
    };

    // Outbound notifications: SMTP when configured, otherwise the log
    let notifier: Arc<dyn Notifier> = if config.email.is_configured() {
        tracing::info!("Email notifications enabled");
        Arc::new(SystemEmailService::new(config.email.clone()))
    } else {
        tracing::warn!("SMTP is not configured; notifications will only be logged");
        Arc::new(LogNotifier)
    };

    let state = Arc::new(AppState::new(config.clone(), db, notifier));

    // Background maintenance
    grievance_desk::services::cleanup::spawn_cleanup_task(
        state.registration_cleanup(),
        config.registration.purge_interval_seconds,
    );
    grievance_desk::api::rate_limit::spawn_cleanup_task(
        state.rate_limiter.clone(),
        config.rate_limit.cleanup_interval,
    );

    let app = grievance_desk::api::create_router(state);

    // Start API server
    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind {}", api_addr))?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
