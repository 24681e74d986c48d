//! Shutdown signal handling

use anyhow::Result;
use tokio::signal;
use tracing::info;

/// Wait for Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown() -> Result<()> {
    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down");
        }
        result = sigterm() => {
            result?;
            info!("Received SIGTERM, shutting down");
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn sigterm() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn sigterm() -> Result<()> {
    std::future::pending().await
}
