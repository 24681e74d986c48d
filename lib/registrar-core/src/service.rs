//! Service definitions and registry records

use crate::Endpoint;
use serde::{Deserialize, Serialize};

/// Length of the container id prefix used in service ids.
pub const SHORT_ID_LEN: usize = 12;

/// Leading [`SHORT_ID_LEN`] characters of a container id.
///
/// Ids shorter than that are returned whole.
pub fn short_id(container_id: &str) -> &str {
    container_id.get(..SHORT_ID_LEN).unwrap_or(container_id)
}

/// Registry id for `service_name` running in `container_id`.
///
/// The same container and service always map to the same id, and two
/// services on one container never collide.
pub fn service_id(service_name: &str, container_id: &str) -> String {
    format!("{}-{}", service_name, short_id(container_id))
}

/// A registry-ready description of one endpoint derived from container labels
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl ServiceDefinition {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }
}

/// A service as currently stored in the registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl RegistryRecord {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl From<ServiceDefinition> for RegistryRecord {
    fn from(def: ServiceDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name,
            address: def.address,
            port: def.port,
            tags: def.tags,
        }
    }
}
