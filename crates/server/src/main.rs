//! Wellness server - menstrual wellness inference service
//!
//! Serves metric derivation and the cluster, risk and PRWI models over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wellness_server::{api, build_state, config::ServerConfig, spawn_session_purger};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting wellness-server");

    let config = ServerConfig::load()?;
    info!(
        port = config.api_port,
        model_dir = %config.model_dir.display(),
        fallback_models = config.fallback_models,
        "Server configured"
    );

    let state = build_state(&config).await;
    let logger = state.logger.clone();
    logger.log_startup(SERVICE_VERSION, config.api_port);

    let purger = spawn_session_purger(
        state.sessions.clone(),
        config.session_purge_interval(),
        state.metrics.clone(),
        logger.clone(),
    );

    // Models are loaded (or replaced by fallbacks) at this point
    state.health_registry.set_ready(true).await;

    let state = Arc::new(state);
    tokio::select! {
        result = api::serve(config.api_port, state) => {
            if let Err(e) = &result {
                error!(error = %e, "API server failed");
            }
            logger.log_shutdown("server exited");
            purger.abort();
            result
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
            purger.abort();
            Ok(())
        }
    }
}
