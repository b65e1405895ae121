//! Strata - line protocol ingestion server
//!
//! # Usage
//!
//! ```bash
//! # Configure through the environment or a .env file
//! STORAGE_PATH=/var/lib/strata/points.tsv PORT=8086 strata
//!
//! curl -XPOST localhost:8086/write \
//!     --data-binary 'cpu,host=server01 value=0.64 1434055562000000000'
//! ```

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use strata_server::{Config, Server, ShutdownContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    info!("Starting Strata v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {:?}", config);

    let shutdown_timeout = config.shutdown_timeout;
    let server = Arc::new(Server::new(Some(config)).await?);

    // Shut down on SIGINT/SIGTERM
    let signal_server = server.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let ctx = ShutdownContext::with_timeout(shutdown_timeout);
        if let Err(e) = signal_server.shutdown(Some(ctx)).await {
            error!("Shutdown error: {}", e);
        }
    });

    if let Err(e) = server.start().await {
        server.close().await;
        return Err(e.into());
    }

    // The listener stops as soon as shutdown begins; wait for cleanup too.
    server.close().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
