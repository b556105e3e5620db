mod error;
mod routes;
mod state;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rollcall_core::{Config, DocumentStore, LogNotifier, Notifier, TwilioNotifier};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::state::AppState;

/// Prefix for the daily rolling log file
const LOG_FILE_PREFIX: &str = "rollcall.log";

/// Initialize logging. The returned guard must live until shutdown so the
/// file writer flushes.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn build_notifier(config: &Config) -> Result<Option<Arc<dyn Notifier>>> {
    if !config.notifications_enabled {
        info!("Absence alerts disabled");
        return Ok(None);
    }
    let notifier: Arc<dyn Notifier> = match config.twilio.clone() {
        Some(settings) => {
            info!(sender = %settings.from_number, "Absence alerts via Twilio WhatsApp");
            Arc::new(TwilioNotifier::new(settings).context("Failed to build Twilio client")?)
        }
        None => {
            warn!("Twilio credentials not configured; absence alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };
    Ok(Some(notifier))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let data_dir = config.resolved_data_dir();
    let store = DocumentStore::open(&data_dir)
        .with_context(|| format!("Failed to open data directory: {}", data_dir.display()))?;

    let state = AppState::new(
        Arc::new(store),
        config.id_resolution,
        build_notifier(&config)?,
    );
    let app = routes::router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, id_resolution = ?config.id_resolution, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
