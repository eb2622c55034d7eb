//! `mnemosine serve`: run the API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use mnemosine::agent::SystemPrompt;
use mnemosine::api::{start_server, AppState};
use mnemosine::config::Config;
use mnemosine::maintenance::spawn_maintenance;
use mnemosine::providers::{available_models, HttpProviderFactory};
use mnemosine::VERSION;

use super::logging::init_logging;

pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    init_logging(&config.logging, config.app.debug)?;
    config.validate().context("Invalid configuration")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let models = available_models(&config.providers);
    if !models.values().any(|&ok| ok) {
        warn!("No provider API keys configured; prompt requests will fail");
    }
    info!(
        version = VERSION,
        default_model = %config.providers.default_model,
        pool_size = config.pool.size,
        cache_enabled = config.cache.enabled,
        ?models,
        "Starting Mnemosine"
    );

    let system_prompt = SystemPrompt::load(
        config.system_prompt_path.as_deref(),
        &config.app.name,
        VERSION,
    );
    let factory = Arc::new(HttpProviderFactory::new(config.providers.clone()));
    let interval = Duration::from_secs(config.pool.maintenance_interval_secs.max(1));
    let idle_timeout = Duration::from_secs(config.pool.idle_timeout_secs);
    let state = Arc::new(AppState::new(config, factory, &system_prompt));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = spawn_maintenance(
        Arc::clone(&state.pool),
        Arc::clone(&state.cache),
        Arc::clone(&state.rate_limits),
        interval,
        idle_timeout,
        shutdown_rx,
    );

    let shutdown = async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    };

    let served = start_server(Arc::clone(&state), addr, shutdown).await;
    let _ = maintenance.await;
    state.metrics.emit_usage("shutdown");
    served.context("API server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
}
