//! Consul agent integration
pub mod client;
pub mod error;

pub use client::ConsulClient;
pub use error::RegistryError;
