//! Container to service-registry reconciliation
//!
//! This library provides:
//! - Service extraction from container labels
//! - Runtime and registry abstractions with soft-failing gateways
//! - The reconciliation engine: full resync, event handling and the
//!   long-running listener and resync tasks

pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod labels;
pub mod registry;
pub mod runtime;
pub mod service;

#[cfg(test)]
mod testing;


pub use config::{Config, Mode};
pub use endpoint::Endpoint;
pub use engine::{ReconciliationEngine, SyncReport};
pub use error::{CoreError, Result};
pub use labels::LabelExtractor;
pub use registry::{RegistryGateway, RetryPolicy, ServiceCatalog};
pub use runtime::{
    ContainerAction, ContainerDetail, ContainerRef, ContainerRuntime, EventScope, LifecycleEvent,
    RuntimeGateway,
};
pub use service::{RegistryRecord, ServiceDefinition};
