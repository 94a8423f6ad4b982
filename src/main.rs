use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sd_gallery::{
    config::Config,
    store::{ImageStore, LocalFileStorage},
    web::{AppState, create_router},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .init();

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let storage = LocalFileStorage::new(config.data_dir.clone());
    info!(data_dir = %storage.base_dir().display(), "opening image store");
    let store = ImageStore::open(storage).await;

    let router = create_router(AppState::new(store), config.max_upload_bytes);
    let bind_address = config.socket_address();
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!("gallery server started at http://{bind_address}/api/images");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
