//! gorp: HTTP gateway that runs anomaly detection on a local Rserve daemon.
//!
//! # Usage
//!
//! ```bash
//! gorp --addr localhost:8080 --raddr localhost:6311
//!
//! # Profiled env config
//! GORP_PROFILE=PROD PROD_RSERVE_ADDR=localhost:6312 gorp
//! ```

mod api;
mod cli;
mod router;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gorp_core::Config;
use gorp_detect::{Detector, TableExporter};
use gorp_rserve::{ClientOptions, Endpoint, RserveClient};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    gorp_core::config::load_dotenv();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);
    config.log_summary();

    let endpoint = Endpoint::parse(&config.rserve.addr)
        .with_context(|| format!("invalid rserve address '{}'", config.rserve.addr))?;
    let options = ClientOptions {
        eval_timeout: config.rserve.eval_timeout_secs.map(Duration::from_secs),
    };
    let client = RserveClient::connect(&endpoint, options)
        .await
        .with_context(|| format!("failed to connect to rserve at {endpoint}"))?;

    let detector = Detector::new(
        TableExporter::new(config.scratch.clone()),
        Arc::new(client),
        config.rserve.max_pending,
    );
    let app = router::build_router(Arc::new(AppState::new(detector)), config.gateway.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.gateway.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.gateway.listen_addr))?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gateway stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    info!("shutdown signal received");
}
