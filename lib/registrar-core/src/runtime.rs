//! Container runtime abstraction

use crate::service::short_id;
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A running container as returned by a listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
}

/// Inspected state of a single container
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerDetail {
    pub id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// IP address per attached network, keyed by network name
    pub networks: BTreeMap<String, String>,
    /// Published ports, keyed like `80/tcp`, to the bound host ports
    pub ports: BTreeMap<String, Vec<String>>,
}

impl ContainerDetail {
    /// First valid, specified IP across the attached networks.
    pub fn container_ip(&self) -> Option<IpAddr> {
        self.networks
            .values()
            .filter_map(|ip| ip.parse::<IpAddr>().ok())
            .find(|ip| !ip.is_unspecified())
    }

    /// Host port published for `container_port/tcp`.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .get(&format!("{}/tcp", container_port))?
            .iter()
            .find_map(|port| port.parse::<u16>().ok())
            .filter(|port| *port != 0)
    }
}

/// Resource type an event was emitted for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventScope {
    Container,
    Other(String),
}

/// Container actions the registrar reacts to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Update,
    Stop,
    Die,
    Destroy,
}

impl ContainerAction {
    pub const ALL: [ContainerAction; 5] = [
        ContainerAction::Start,
        ContainerAction::Update,
        ContainerAction::Stop,
        ContainerAction::Die,
        ContainerAction::Destroy,
    ];

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(ContainerAction::Start),
            "update" => Some(ContainerAction::Update),
            "stop" => Some(ContainerAction::Stop),
            "die" => Some(ContainerAction::Die),
            "destroy" => Some(ContainerAction::Destroy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Update => "update",
            ContainerAction::Stop => "stop",
            ContainerAction::Die => "die",
            ContainerAction::Destroy => "destroy",
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event from the runtime's event stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub scope: EventScope,
    pub action: String,
    pub actor_id: Option<String>,
}

impl LifecycleEvent {
    pub fn container(action: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            scope: EventScope::Container,
            action: action.into(),
            actor_id: Some(container_id.into()),
        }
    }

    /// The relevant container action and container id, if this event is one
    /// the registrar handles.
    pub fn container_action(&self) -> Option<(ContainerAction, &str)> {
        if self.scope != EventScope::Container {
            return None;
        }
        let id = self.actor_id.as_deref().filter(|id| !id.is_empty())?;
        Some((ContainerAction::parse(&self.action)?, id))
    }
}

/// Queries the registrar needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// List running containers
    async fn list_running(&self) -> Result<Vec<ContainerRef>>;

    /// Inspect a single container
    async fn inspect(&self, container_id: &str) -> Result<ContainerDetail>;

    /// Subscribe to container lifecycle events.
    ///
    /// An `Err` item is terminal for the subscription; the caller
    /// resubscribes.
    fn events(&self) -> BoxStream<'static, Result<LifecycleEvent>>;
}

/// RuntimeGateway turns runtime failures into logged soft failures
#[derive(Clone)]
pub struct RuntimeGateway {
    runtime: Arc<dyn ContainerRuntime>,
}

impl RuntimeGateway {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// List running containers; `None` when the runtime could not be queried.
    pub async fn list_running_containers(&self) -> Option<Vec<ContainerRef>> {
        match self.runtime.list_running().await {
            Ok(containers) => Some(containers),
            Err(e) => {
                error!("Error listing containers: {}", e);
                None
            }
        }
    }

    /// Inspect one container; `None` when it could not be inspected.
    pub async fn inspect(&self, container_id: &str) -> Option<ContainerDetail> {
        match self.runtime.inspect(container_id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!(container = %short_id(container_id), "Error inspecting container: {}", e);
                None
            }
        }
    }

    pub fn subscribe(&self) -> BoxStream<'static, Result<LifecycleEvent>> {
        debug!("Subscribing to container events");
        self.runtime.events()
    }
}
