//! # Sop Server
//!
//! Loads configuration, wires the repository and cache manager, and serves
//! the REST API until SIGINT or SIGTERM.

use sop_config::{AppConfig, ConfigLoader, ObservabilityConfig};
use sop_core::{SopError, SopResult};
use sop_rest::create_router;
use tokio::signal;
use tracing::{error, info};

mod app;
mod telemetry;

#[tokio::main]
async fn main() {
    let loader = match ConfigLoader::from_default_location() {
        Ok(loader) => loader,
        Err(e) => {
            telemetry::init_logging(&ObservabilityConfig::default());
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let config = loader.get();

    telemetry::init_logging(&config.observability);
    info!("Starting Sop server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    if let Err(e) = run(config).await {
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> SopResult<()> {
    let app = app::App::build(&config).await?;
    let router = create_router(app.state.clone(), &config.server);

    let addr = config.server.addr();
    info!("Starting REST server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SopError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SopError::Internal(format!("REST server error: {}", e)))?;

    app.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received terminate signal, shutting down"),
    }
}
