use anyhow::{Context, Result};
use registrar_consul::ConsulClient;
use registrar_core::{ContainerRuntime, ReconciliationEngine, ServiceCatalog};
use registrar_docker::DockerClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod signals;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting registrar...");

    let config = config::from_env().context("Invalid configuration")?;
    config.log_summary();

    let docker = DockerClient::connect(config.runtime_endpoint.as_deref())
        .context("Failed to create Docker client")?;
    docker.ping().await.context("Failed to reach Docker")?;
    info!("Docker connection established");

    let consul = ConsulClient::new(&config.registry_url).context("Failed to create Consul client")?;
    consul.ping().await.context("Failed to reach Consul")?;

    let cancel = CancellationToken::new();
    let engine = Arc::new(ReconciliationEngine::new(
        &config,
        Arc::new(docker),
        Arc::new(consul),
        cancel.clone(),
    ));

    tokio::spawn(async move {
        if let Err(e) = signals::wait_for_shutdown().await {
            error!("Signal handling failed: {}", e);
        }
        cancel.cancel();
    });

    engine.run().await;
    info!("Registrar stopped");

    Ok(())
}

/// Log to stdout, filtered by `RUST_LOG` (default `info`); `LOG_FORMAT=json`
/// switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
