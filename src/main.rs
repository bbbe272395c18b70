use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bidgate::admission::Sweeper;
use bidgate::config::{BidgateConfig, LoggingConfig};
use bidgate::http::{AppState, HttpServer};

/// Bid admission control and live notification service.
#[derive(Debug, Parser)]
#[command(name = "bidgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "BIDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = BidgateConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }

    init_tracing(&config.logging);

    info!("Starting Bidgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        quota = config.admission.quota,
        window_secs = config.admission.window_secs,
        supersede = ?config.notify.supersede,
        on_write_failure = ?config.notify.on_write_failure,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config);
    let sweeper =
        Sweeper::new(state.admission.clone(), config.admission.sweep_interval()).spawn();

    let registry = state.registry.clone();
    let server = HttpServer::new(config.server.http_addr, state);

    // Live sessions would otherwise hold the server open
    server
        .serve_with_shutdown(async move {
            shutdown_signal().await;
            registry.close_all().await;
        })
        .await?;

    sweeper.shutdown().await?;

    info!("Bidgate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
