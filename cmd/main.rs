use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ember_gateway::{GatewayApp, GatewayConfig, GatewayStores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = GatewayConfig::parse();

    let stores = GatewayStores::redis(&config).await?;
    let app = GatewayApp::new(&config, stores);
    let addr = app.start().await?;
    info!(gateway_id = %config.gateway_id, addr = %addr, "gateway started");

    shutdown_signal().await?;
    info!("shutdown signal received");
    app.stop().await;
    Ok(())
}

/// 等待 SIGINT / SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
