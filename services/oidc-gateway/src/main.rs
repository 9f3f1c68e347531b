//! OIDC Gateway
//!
//! Single-binary service that:
//! 1. Loads provider + client registration from TOML
//! 2. Starts the OIDC client (initial JWKS fetch + background refresh)
//! 3. Serves the PKCE login flow, bearer-guarded profile, and introspection
//! 4. Stops key refresh after the listener drains on SIGTERM/SIGINT

mod config;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oidc_client::{Client, Introspector, JwtProfileIntrospector};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::routes::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting oidc-gateway");

    let prometheus_handle = metrics::install_recorder()?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        issuer = %config.oidc.issuer,
        client_id = %config.oidc.client_id,
        listen_addr = %config.server.listen_addr,
        key_refresh_secs = config.oidc.key_refresh_secs,
        "configuration loaded"
    );

    let http = reqwest::Client::new();
    let endpoints = config.oidc.endpoint_profile();

    let client: Client = Client::new(
        http.clone(),
        config.oidc.issuer.clone(),
        config.oidc.client_id.clone(),
        endpoints.clone(),
        Duration::from_secs(config.oidc.key_refresh_secs),
    )
    .await;
    let client = Arc::new(client);

    let introspector: Option<Arc<dyn Introspector>> = match &config.introspection.key_file {
        Some(path) => {
            let introspector = JwtProfileIntrospector::from_file(
                http.clone(),
                config.oidc.issuer.clone(),
                endpoints.clone(),
                path,
            )
            .await
            .with_context(|| format!("failed to load introspection key {}", path.display()))?;
            info!(client_id = introspector.client_id(), "introspection enabled");
            Some(Arc::new(introspector))
        }
        None => {
            info!("no introspection key configured, /introspect disabled");
            None
        }
    };

    let state = AppState::new(
        client.clone(),
        introspector,
        config.oidc.redirect_uri.clone(),
        config.oidc.scopes.clone(),
        prometheus_handle,
    );
    let app = build_router(state).layer(tower::limit::ConcurrencyLimitLayer::new(
        config.server.max_connections,
    ));

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    client.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
