//! Registrar configuration
//!
//! A [`Config`] is built once at startup by the binary and handed to every
//! component constructor. Nothing in this crate reads the process
//! environment.

use crate::{CoreError, Result};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Shortest resync interval accepted; lower values are raised to this.
pub const MIN_RESYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Longest resync interval accepted; higher values are lowered to this.
pub const MAX_RESYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key prefix of the ownership tag written into every managed record.
pub const OWNERSHIP_TAG_KEY: &str = "registrar_id";

/// How a service's address and port are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    /// Container network IP and the port declared in the labels.
    #[default]
    Container,
    /// Configured public IP and the host port published for the declared port.
    Host,
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" => Ok(Mode::Container),
            "host" => Ok(Mode::Host),
            other => Err(CoreError::InvalidConfiguration(format!(
                "invalid mode '{}', expected 'container' or 'host'",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Container => f.write_str("container"),
            Mode::Host => f.write_str("host"),
        }
    }
}

/// Registrar configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Address/port resolution mode
    pub mode: Mode,
    /// Public IP advertised in host mode
    pub public_ip: Option<IpAddr>,
    /// Base URL of the service registry
    pub registry_url: String,
    /// Interval between full resyncs
    pub resync_interval: Duration,
    /// Container runtime endpoint; local defaults when unset
    pub runtime_endpoint: Option<String>,
    /// Attempts made per deregistration
    pub deregister_retries: u32,
    /// Pause between deregistration attempts
    pub deregister_retry_delay: Duration,
    /// Identity of this instance, used to build the ownership tag
    pub registrar_id: Option<String>,
    /// Pause after a start/update event before inspecting the container
    pub settle_delay: Duration,
    /// Label namespace the service declarations live under
    pub label_provider: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Container,
            public_ip: None,
            registry_url: "http://consul:8500".to_string(),
            resync_interval: Duration::from_secs(60),
            runtime_endpoint: None,
            deregister_retries: 3,
            deregister_retry_delay: Duration::from_secs(2),
            registrar_id: None,
            settle_delay: Duration::from_secs(1),
            label_provider: "traefik".to_string(),
        }
    }
}

impl Config {
    /// Check the configuration, normalising values that have a floor.
    ///
    /// Host mode without a public IP is rejected. A resync interval outside
    /// [`MIN_RESYNC_INTERVAL`]..=[`MAX_RESYNC_INTERVAL`] is clamped with a
    /// warning, and a retry count of zero becomes a single attempt.
    pub fn validate(mut self) -> Result<Self> {
        if self.mode == Mode::Host && self.public_ip.is_none() {
            return Err(CoreError::InvalidConfiguration(
                "host mode requires a public IP".to_string(),
            ));
        }

        if self.registry_url.trim().is_empty() {
            return Err(CoreError::InvalidConfiguration(
                "registry URL must not be empty".to_string(),
            ));
        }

        if self.label_provider.trim().is_empty() {
            return Err(CoreError::InvalidConfiguration(
                "label provider must not be empty".to_string(),
            ));
        }

        if self.resync_interval < MIN_RESYNC_INTERVAL {
            warn!(
                "Resync interval {:?} is too low, using {:?}",
                self.resync_interval, MIN_RESYNC_INTERVAL
            );
            self.resync_interval = MIN_RESYNC_INTERVAL;
        } else if self.resync_interval > MAX_RESYNC_INTERVAL {
            warn!(
                "Resync interval {:?} is too high, using {:?}",
                self.resync_interval, MAX_RESYNC_INTERVAL
            );
            self.resync_interval = MAX_RESYNC_INTERVAL;
        }

        if self.deregister_retries == 0 {
            warn!("Deregister retries set to 0, using a single attempt");
            self.deregister_retries = 1;
        }

        if matches!(self.registrar_id.as_deref(), Some(id) if id.trim().is_empty()) {
            self.registrar_id = None;
        }

        Ok(self)
    }

    /// Tag marking registry records as owned by this instance.
    ///
    /// `None` when no instance identity is configured, in which case this
    /// instance never deregisters anything.
    pub fn ownership_tag(&self) -> Option<String> {
        self.registrar_id
            .as_ref()
            .map(|id| format!("{}={}", OWNERSHIP_TAG_KEY, id))
    }

    /// Log the effective configuration once at startup.
    pub fn log_summary(&self) {
        info!("Registrar configuration:");
        info!("  - Mode: {}", self.mode);
        match self.mode {
            Mode::Host => {
                if let Some(ip) = self.public_ip {
                    info!("  - Public IP: {}", ip);
                }
                info!("  - Port: published host port (port label not tagged)");
            }
            Mode::Container => {
                info!("  - Address: container network IP");
                info!("  - Port: declared label port (port label tagged)");
            }
        }
        info!("  - Registry: {}", self.registry_url);
        info!("  - Resync interval: {:?}", self.resync_interval);
        match &self.runtime_endpoint {
            Some(endpoint) => info!("  - Runtime: {}", endpoint),
            None => info!("  - Runtime: local socket"),
        }
        info!(
            "  - Deregister retries: {} (delay {:?})",
            self.deregister_retries, self.deregister_retry_delay
        );
        match &self.registrar_id {
            Some(id) => info!("  - Registrar ID: {}", id),
            None => warn!("  - Registrar ID: unset, orphan cleanup disabled"),
        }
        info!("  - Label provider: {}", self.label_provider);
    }
}
