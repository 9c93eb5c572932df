//! social-hubd - the social-hub daemon.

use social_hub::config::{self, Config, LogFormat};
use social_hub::db::Database;
use social_hub::hub::Hub;
use social_hub::network::{Gateway, ServerContext};
use social_hub::{auth, http, metrics};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.server.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        path = %config.listen.path,
        "Starting social-hub"
    );

    let db = Database::new(&config.database.path).await?;
    let (hub, registry_task) = Hub::spawn(config.limits.hub_commands);

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        let hub = hub.clone();
        tokio::spawn(async move {
            http::run_http_server(metrics_port, hub).await;
        });
        info!(port = metrics_port, "Metrics HTTP server started");
    }

    let authenticator = auth::from_config(&config.auth, db.clone());
    let ctx = ServerContext {
        hub: hub.clone(),
        db,
        config: Arc::new(config),
    };
    let gateway = Gateway::bind(ctx, authenticator).await?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    gateway.run(shutdown).await?;

    if let Err(e) = hub.shutdown().await {
        warn!(error = %e, "Registry already stopped");
    }
    if let Err(e) = registry_task.await {
        error!(error = %e, "Registry task failed");
    }
    info!("social-hub stopped");
    Ok(())
}
