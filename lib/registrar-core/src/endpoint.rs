//! Endpoint management
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reachable `address:port` pair derived from a running container.
///
/// Endpoints are only collected into sets to spot resync passes that see
/// running containers but nothing to register; they are never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
