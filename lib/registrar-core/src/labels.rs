//! Service extraction from container labels
//!
//! A container advertises services through reverse-proxy style labels:
//!
//! ```text
//! traefik.enable=true
//! traefik.http.services.web.loadbalancer.server.port=80
//! traefik.http.routers.web.rule=Host(`example.com`)
//! ```
//!
//! Each `services.<NAME>...port` label yields one [`ServiceDefinition`]. Tags
//! carry the provider's global labels plus the labels scoped to that service.

use crate::config::{Config, Mode};
use crate::runtime::ContainerDetail;
use crate::service::{service_id, ServiceDefinition};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, warn};

const PORT_LABEL_SUFFIX: &str = ".loadbalancer.server.port";

/// LabelExtractor derives service definitions from container labels
#[derive(Clone, Debug)]
pub struct LabelExtractor {
    provider: String,
    mode: Mode,
    public_ip: Option<IpAddr>,
}

impl LabelExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            provider: config.label_provider.clone(),
            mode: config.mode,
            public_ip: config.public_ip,
        }
    }

    fn enable_label(&self) -> String {
        format!("{}.enable", self.provider)
    }

    fn services_prefix(&self) -> String {
        format!("{}.http.services.", self.provider)
    }

    /// Declared services and their ports.
    ///
    /// The service name must be a single label segment:
    /// `traefik.http.services.a.b.loadbalancer.server.port` declares nothing.
    /// Labels whose port value does not parse are skipped with a warning.
    pub fn service_names(&self, labels: &BTreeMap<String, String>) -> BTreeMap<String, u16> {
        let prefix = self.services_prefix();
        let mut services = BTreeMap::new();

        for (key, value) in labels {
            let Some(name) = key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(PORT_LABEL_SUFFIX))
            else {
                continue;
            };

            if name.is_empty() || name.contains('.') {
                debug!("Ignoring malformed service label: {}", key);
                continue;
            }

            match value.trim().parse::<u16>() {
                Ok(port) if port > 0 => {
                    services.insert(name.to_string(), port);
                }
                _ => warn!("Invalid port label: {}={}", key, value),
            }
        }

        services
    }

    /// Tags for `service_name`: global provider labels plus the labels
    /// scoped to this service, as `key=value`.
    ///
    /// In host mode the declared port label is left out, since the
    /// advertised port is the published host port instead.
    pub fn build_tags(&self, labels: &BTreeMap<String, String>, service_name: &str) -> Vec<String> {
        let provider_prefix = format!("{}.", self.provider);
        let service_scope = format!(".services.{}.", service_name);
        let router_scope = format!(".routers.{}.", service_name);
        let mut tags = Vec::new();

        for (key, value) in labels {
            if !key.starts_with(&provider_prefix) {
                continue;
            }

            let scoped = key.contains(".services.") || key.contains(".routers.");
            if !scoped {
                tags.push(format!("{}={}", key, value));
                continue;
            }

            if !key.contains(&service_scope) && !key.contains(&router_scope) {
                continue;
            }

            if self.mode == Mode::Host && key.ends_with(PORT_LABEL_SUFFIX) {
                continue;
            }

            tags.push(format!("{}={}", key, value));
        }

        tags
    }

    /// All services the container currently exposes.
    ///
    /// Requires `<provider>.enable=true`. Services whose address or port
    /// cannot be resolved in the current mode are skipped with a warning.
    pub fn extract(&self, container: &ContainerDetail) -> Vec<ServiceDefinition> {
        if container.labels.get(&self.enable_label()).map(String::as_str) != Some("true") {
            return Vec::new();
        }

        let services = self.service_names(&container.labels);
        let mut result = Vec::with_capacity(services.len());

        for (name, label_port) in services {
            let (address, port) = match self.mode {
                Mode::Host => {
                    let Some(public_ip) = self.public_ip else {
                        warn!("{}/{}: no public IP configured", container.name, name);
                        continue;
                    };
                    let Some(host_port) = container.host_port(label_port) else {
                        warn!(
                            "{}/{}: port {} is not published on the host",
                            container.name, name, label_port
                        );
                        continue;
                    };
                    (public_ip.to_string(), host_port)
                }
                Mode::Container => {
                    let Some(ip) = container.container_ip() else {
                        warn!("{}: could not determine container IP", container.name);
                        continue;
                    };
                    (ip.to_string(), label_port)
                }
            };

            result.push(ServiceDefinition {
                id: service_id(&name, &container.id),
                tags: self.build_tags(&container.labels, &name),
                name,
                address,
                port,
            });
        }

        result
    }
}
