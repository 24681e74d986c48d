//! Docker Engine integration
pub mod client;
pub mod error;
pub mod runtime;

pub use client::DockerClient;
pub use error::RuntimeError;
