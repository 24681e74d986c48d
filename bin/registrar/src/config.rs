//! Configuration from environment variables

use anyhow::{Context, Result};
use registrar_core::{Config, Mode};
use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;

/// Load the registrar configuration from the process environment.
pub fn from_env() -> Result<Config> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a configuration from `lookup`, falling back to defaults.
///
/// Values may be wrapped in double quotes. Integers that do not parse fall
/// back to their default with a warning.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let get = |key: &str| {
        lookup(key)
            .map(|value| value.trim().trim_matches('"').to_string())
            .filter(|value| !value.is_empty())
    };
    let get_u64 = |key: &str, default: u64| match get(key) {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: '{}', using {}", key, value, default);
            default
        }),
    };

    let defaults = Config::default();

    let mode = match get("MODE") {
        Some(mode) => mode.parse::<Mode>()?,
        None => defaults.mode,
    };

    let public_ip = get("IP")
        .map(|ip| ip.parse::<IpAddr>().with_context(|| format!("invalid IP '{}'", ip)))
        .transpose()?;

    if lookup("REGISTRAR_ID").is_some() && get("REGISTRAR_ID").is_none() {
        warn!("REGISTRAR_ID is empty, falling back to the host name");
    }
    let registrar_id = get("REGISTRAR_ID")
        .or_else(|| get("REGISTRADOR_ID"))
        .or_else(default_registrar_id);

    let config = Config {
        mode,
        public_ip,
        registry_url: get("CONSUL_URL").unwrap_or(defaults.registry_url),
        resync_interval: Duration::from_secs(get_u64(
            "RESYNC_INTERVAL",
            defaults.resync_interval.as_secs(),
        )),
        runtime_endpoint: get("DOCKER_SOCKET"),
        deregister_retries: get_u64("DEREGISTER_RETRIES", defaults.deregister_retries.into())
            .try_into()
            .unwrap_or(u32::MAX),
        deregister_retry_delay: Duration::from_secs(get_u64(
            "DEREGISTER_RETRY_DELAY",
            defaults.deregister_retry_delay.as_secs(),
        )),
        registrar_id,
        settle_delay: Duration::from_millis(get_u64(
            "SETTLE_DELAY_MS",
            defaults.settle_delay.as_millis() as u64,
        )),
        label_provider: get("LABEL_PROVIDER").unwrap_or(defaults.label_provider),
    };

    Ok(config.validate()?)
}

/// The host name, so instances on different hosts own disjoint records.
fn default_registrar_id() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
}
