//! Service registry access

use crate::config::Config;
use crate::service::{RegistryRecord, ServiceDefinition};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Operations the registrar needs from a service registry
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Register or update a service
    async fn register(&self, service: &ServiceDefinition) -> Result<()>;

    /// Deregister a service
    async fn deregister(&self, service_id: &str) -> Result<()>;

    /// All records currently in the registry, keyed by id
    async fn services(&self) -> Result<HashMap<String, RegistryRecord>>;
}

/// Retry policy for deregistration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.deregister_retries.max(1),
            delay: config.deregister_retry_delay,
        }
    }

    /// Whether another attempt follows attempt number `attempt` (1-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// RegistryGateway applies ownership tagging and retry on top of a catalog.
///
/// Every operation fails soft: errors are logged and reported as `false` or
/// an empty listing, to be corrected by the next resync.
#[derive(Clone)]
pub struct RegistryGateway {
    catalog: Arc<dyn ServiceCatalog>,
    ownership_tag: Option<String>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RegistryGateway {
    pub fn new(
        catalog: Arc<dyn ServiceCatalog>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            ownership_tag: config.ownership_tag(),
            retry: RetryPolicy::from_config(config),
            cancel,
        }
    }

    /// Whether `record` carries this instance's ownership tag.
    ///
    /// Always false when no instance identity is configured.
    pub fn owns(&self, record: &RegistryRecord) -> bool {
        self.ownership_tag
            .as_deref()
            .is_some_and(|tag| record.has_tag(tag))
    }

    /// Register or update a service, adding the ownership tag. Single attempt.
    pub async fn register(&self, service: &ServiceDefinition) -> bool {
        let mut service = service.clone();
        if let Some(tag) = &self.ownership_tag {
            if !service.tags.iter().any(|t| t == tag) {
                service.tags.push(tag.clone());
            }
        }

        match self.catalog.register(&service).await {
            Ok(()) => {
                info!(
                    service_id = %service.id,
                    "Registered {} ({}:{})",
                    service.name, service.address, service.port
                );
                true
            }
            Err(e) => {
                error!(service_id = %service.id, "Error registering service: {}", e);
                false
            }
        }
    }

    /// Deregister a service, retrying with a fixed delay.
    ///
    /// Returns false once every attempt failed, or when shutdown interrupts
    /// the wait between attempts.
    pub async fn deregister(&self, service_id: &str) -> bool {
        let mut attempt = 1;
        loop {
            let err = match self.catalog.deregister(service_id).await {
                Ok(()) => {
                    info!(service_id = %service_id, "Deregistered service");
                    return true;
                }
                Err(e) => e,
            };

            if !self.retry.should_retry(attempt) {
                error!(
                    service_id = %service_id,
                    "Giving up deregistering after {} attempts: {}",
                    attempt, err
                );
                return false;
            }

            warn!(
                service_id = %service_id,
                "Deregister attempt {}/{} failed: {}",
                attempt, self.retry.max_attempts, err
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(service_id = %service_id, "Shutdown requested, abandoning deregistration");
                    return false;
                }
                _ = tokio::time::sleep(self.retry.delay) => {}
            }
            attempt += 1;
        }
    }

    /// All registry records; empty when the registry could not be listed.
    pub async fn list_all(&self) -> HashMap<String, RegistryRecord> {
        match self.catalog.services().await {
            Ok(records) => records,
            Err(e) => {
                error!("Error listing registry services: {}", e);
                HashMap::new()
            }
        }
    }
}
