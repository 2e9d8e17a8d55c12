use std::sync::Arc;

use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rangebook::config::Config;
use rangebook::engine::Engine;
use rangebook::password::CredentialHasher;
use rangebook::service::{BookingService, Policy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rangebook=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    rangebook::observability::init(config.metrics_port);

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path(), config.capacities)?);
    let hasher = CredentialHasher::default();

    if let Some(path) = &config.legacy_import {
        rangebook::legacy::import_file(&engine, path).await?;
    }
    engine.migrate_legacy_credentials(&hasher).await?;

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        rangebook::compactor::run_compactor(compactor_engine, threshold).await;
    });

    let service = BookingService::new(
        engine,
        hasher,
        Policy {
            require_password: config.require_password,
            enforce_open_days: config.enforce_open_days,
        },
    );
    let app = rangebook::http::router(service, HeaderValue::from_str(&config.allowed_origin)?);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("rangebook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  allowed_origin: {}", config.allowed_origin);
    info!(
        "  capacities: .22 = {}, rifle = {}",
        config.capacities.twenty_two, config.capacities.rifle
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("rangebook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
