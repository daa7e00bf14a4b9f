use anyhow::{Context, Result};
use chunk_drive::{
    build_app,
    config::{AppConfig, BackendKind},
    gateway::{StorageGateway, local::LocalGateway, webdav::WebDavGateway},
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting chunk-drive with config: {:?}", cfg);

    // --- Initialize storage gateway ---
    let gateway = build_gateway(&cfg).await?;
    tracing::info!(backend = gateway.kind(), "storage gateway ready");

    // --- Build router ---
    let app = build_app(gateway, cfg.max_chunk_bytes);

    // --- Start server ---
    let listener = bind_listener(&cfg).await?;

    tracing::info!(addr = %listener.local_addr()?, "chunk-drive listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_gateway(cfg: &AppConfig) -> Result<Arc<dyn StorageGateway>> {
    match cfg.backend {
        BackendKind::Webdav => {
            let url = cfg
                .webdav_url
                .as_deref()
                .context("WEBDAV_URL is required for the webdav backend")?;
            let gateway = WebDavGateway::new(
                url,
                cfg.webdav_user.clone(),
                cfg.webdav_password.clone(),
            )?;
            Ok(Arc::new(gateway))
        }
        BackendKind::Local => {
            let gateway = LocalGateway::new(&cfg.storage_dir)
                .await
                .with_context(|| format!("preparing storage directory {}", cfg.storage_dir))?;
            Ok(Arc::new(gateway))
        }
    }
}

/// Bind the configured address. A wildcard host the process may not bind
/// (container sandboxes) is retried on loopback.
async fn bind_listener(cfg: &AppConfig) -> Result<TcpListener> {
    let addr = cfg.addr();
    let err = match TcpListener::bind(&addr).await {
        Ok(listener) => return Ok(listener),
        Err(err) => err,
    };
    let wildcard = matches!(cfg.host.as_str(), "0.0.0.0" | "::");
    if err.kind() != ErrorKind::PermissionDenied || !wildcard {
        return Err(err).with_context(|| format!("binding {}", addr));
    }

    let loopback = format!("127.0.0.1:{}", cfg.port);
    tracing::warn!(%addr, %loopback, error = %err, "wildcard bind refused, using loopback");
    TcpListener::bind(&loopback)
        .await
        .with_context(|| format!("binding {}", loopback))
}
