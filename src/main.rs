use std::net::SocketAddr;

use dotenvy::dotenv;
use tracing::{error, info};

use databox::bootstrap::app_context::{AppContext, AppServices};
use databox::bootstrap::config::{BackendKind, Config};
use databox::bootstrap::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "databox=debug,axum=info,tower_http=info".into()),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(?cfg, "Starting Databox server");

    // Ensure uploads dir exists
    if matches!(cfg.storage_backend, BackendKind::Filesystem) {
        if let Err(e) = tokio::fs::create_dir_all(&cfg.uploads_dir).await {
            tracing::warn!(error = ?e, dir = %cfg.uploads_dir, "Failed to create uploads dir");
        }
    }

    let services = AppServices::from_config(&cfg)?;
    let ctx = AppContext::new(cfg.clone(), services);
    let app = build_router(ctx);

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cfg.api_port));
    info!(%api_addr, backend = ?cfg.storage_backend, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(?e, "API server failed");
        return Err(e.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown_requested");
}
