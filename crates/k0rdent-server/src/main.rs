//! k0rdent MCP server entry point.

use std::sync::Arc;

use k0rdent_core::{init_logging, Settings};
use k0rdent_server::{build_router, ServerState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    init_logging(&settings.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?settings.auth_mode,
        "starting k0rdent MCP server"
    );

    let state = Arc::new(
        ServerState::from_settings(settings)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );

    // warm the catalog cache; tool calls refresh it again on demand
    if let Err(err) = state.catalog.refresh().await {
        warn!("initial catalog fetch failed: {err}");
    }

    let listen_addr = state.settings.listen_addr;
    let router = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(listen_addr).await?;
    info!(%listen_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
