//! Container runtime queries against the Docker Engine API

use crate::client::DockerClient;
use crate::error::RuntimeError;
use async_trait::async_trait;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessage, EventMessageTypeEnum};
use bollard::query_parameters::{EventsOptions, InspectContainerOptions, ListContainersOptions};
use futures::stream::{BoxStream, StreamExt};
use registrar_core::runtime::{ContainerAction, ContainerRuntime};
use registrar_core::{ContainerDetail, ContainerRef, CoreError, EventScope, LifecycleEvent};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Buffered events between the Docker stream and the consumer
const EVENT_BUFFER: usize = 64;

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn ping(&self) -> registrar_core::Result<()> {
        self.inner().ping().await.map_err(RuntimeError::from)?;
        Ok(())
    }

    async fn list_running(&self) -> registrar_core::Result<Vec<ContainerRef>> {
        let options = ListContainersOptions {
            all: false,
            ..Default::default()
        };
        let containers = self
            .inner()
            .list_containers(Some(options))
            .await
            .map_err(RuntimeError::from)?;

        debug!("Listed {} running containers", containers.len());
        Ok(containers.into_iter().filter_map(container_ref).collect())
    }

    async fn inspect(&self, container_id: &str) -> registrar_core::Result<ContainerDetail> {
        let response = self
            .inner()
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(RuntimeError::from)?;
        Ok(container_detail(response)?)
    }

    fn events(&self) -> BoxStream<'static, registrar_core::Result<LifecycleEvent>> {
        let docker = self.inner().clone();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut events = docker.events(Some(events_options()));
            while let Some(item) = events.next().await {
                let item = item
                    .map(lifecycle_event)
                    .map_err(|e| CoreError::EventStream(e.to_string()));
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            debug!("Docker event forwarder finished");
        });

        ReceiverStream::new(rx).boxed()
    }
}

/// Server-side filter: container events with an action the registrar handles.
fn events_options() -> EventsOptions {
    let actions = ContainerAction::ALL
        .iter()
        .map(|action| action.as_str().to_string())
        .collect();

    EventsOptions {
        filters: Some(HashMap::from([
            ("type".to_string(), vec!["container".to_string()]),
            ("event".to_string(), actions),
        ])),
        ..Default::default()
    }
}

fn container_ref(summary: ContainerSummary) -> Option<ContainerRef> {
    let id = summary.id?;
    let name = summary
        .names
        .and_then(|names| names.into_iter().next())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
    Some(ContainerRef { id, name })
}

fn container_detail(response: ContainerInspectResponse) -> Result<ContainerDetail, RuntimeError> {
    let id = response.id.ok_or(RuntimeError::MissingId)?;
    let name = response
        .name
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());

    let labels: BTreeMap<String, String> = response
        .config
        .and_then(|config| config.labels)
        .map(|labels| labels.into_iter().collect())
        .unwrap_or_default();

    let mut networks = BTreeMap::new();
    let mut ports = BTreeMap::new();
    if let Some(settings) = response.network_settings {
        for (network, endpoint) in settings.networks.unwrap_or_default() {
            if let Some(ip) = endpoint.ip_address.filter(|ip| !ip.is_empty()) {
                networks.insert(network, ip);
            }
        }

        for (port, bindings) in settings.ports.unwrap_or_default() {
            let host_ports: Vec<String> = bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|binding| binding.host_port)
                .filter(|host_port| !host_port.is_empty())
                .collect();
            if !host_ports.is_empty() {
                ports.insert(port, host_ports);
            }
        }
    }

    Ok(ContainerDetail {
        id,
        name,
        labels,
        networks,
        ports,
    })
}

fn lifecycle_event(message: EventMessage) -> LifecycleEvent {
    let scope = match message.typ {
        Some(EventMessageTypeEnum::CONTAINER) => EventScope::Container,
        Some(other) => EventScope::Other(other.to_string()),
        None => EventScope::Other(String::new()),
    };

    LifecycleEvent {
        scope,
        action: message.action.unwrap_or_default(),
        actor_id: message.actor.and_then(|actor| actor.id),
    }
}
