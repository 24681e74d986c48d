//! HTTP client for the Consul agent API

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use registrar_core::{RegistryRecord, ServiceCatalog, ServiceDefinition};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for a single Consul request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Service registration body for `PUT /v1/agent/service/register`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
}

/// Entry of `GET /v1/agent/services`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl From<AgentService> for RegistryRecord {
    fn from(service: AgentService) -> Self {
        Self {
            id: service.id,
            name: service.service,
            address: service.address,
            port: service.port,
            tags: service.tags.unwrap_or_default(),
        }
    }
}

/// ConsulClient talks to the local Consul agent
#[derive(Clone, Debug)]
pub struct ConsulClient {
    http: Client,
    base_url: Url,
}

impl ConsulClient {
    /// Create a client for the agent at `base_url`.
    ///
    /// A URL without a scheme is taken as plain HTTP.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        let base_url = if base_url.contains("://") {
            base_url.to_string()
        } else {
            format!("http://{}", base_url)
        };
        let base_url =
            Url::parse(&base_url).map_err(|e| RegistryError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(base_url.to_string()));
        }

        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Address of the current cluster leader
    pub async fn leader(&self) -> Result<String> {
        let response = self.http.get(self.url(&["v1", "status", "leader"])?).send().await?;
        let leader: String = check(response).await?.json().await?;
        if leader.is_empty() {
            return Err(RegistryError::Status {
                status: 200,
                body: "cluster has no leader".to_string(),
            });
        }
        Ok(leader)
    }
}

/// Turn non-success responses into errors
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RegistryError::Status {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[async_trait]
impl ServiceCatalog for ConsulClient {
    async fn ping(&self) -> registrar_core::Result<()> {
        let leader = self.leader().await?;
        info!("Connected to Consul at {} (leader {})", self.base_url, leader);
        Ok(())
    }

    async fn register(&self, service: &ServiceDefinition) -> registrar_core::Result<()> {
        let body = AgentServiceRegistration {
            id: &service.id,
            name: &service.name,
            address: &service.address,
            port: service.port,
            tags: &service.tags,
        };
        let url = self.url(&["v1", "agent", "service", "register"])?;
        let response = self
            .http
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(RegistryError::from)?;
        check(response).await?;
        debug!(service_id = %service.id, "Consul accepted registration");
        Ok(())
    }

    async fn deregister(&self, service_id: &str) -> registrar_core::Result<()> {
        let url = self.url(&["v1", "agent", "service", "deregister", service_id])?;
        let response = self.http.put(url).send().await.map_err(RegistryError::from)?;
        check(response).await?;
        Ok(())
    }

    async fn services(&self) -> registrar_core::Result<HashMap<String, RegistryRecord>> {
        let url = self.url(&["v1", "agent", "services"])?;
        let response = self.http.get(url).send().await.map_err(RegistryError::from)?;
        let body = check(response).await?.text().await.map_err(RegistryError::from)?;
        let services: HashMap<String, AgentService> =
            serde_json::from_str(&body).map_err(RegistryError::from)?;

        Ok(services
            .into_iter()
            .map(|(id, service)| (id, service.into()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> ServiceDefinition {
        ServiceDefinition {
            id: "web-abc123456789".to_string(),
            name: "web".to_string(),
            address: "10.0.0.5".to_string(),
            port: 80,
            tags: vec![
                "traefik.enable=true".to_string(),
                "registrar_id=node-1".to_string(),
            ],
        }
    }

    #[test]
    fn test_base_url_normalisation() {
        let client = ConsulClient::new("consul:8500/").unwrap();
        assert_eq!(
            client.url(&["v1", "agent", "services"]).unwrap().as_str(),
            "http://consul:8500/v1/agent/services"
        );

        let client = ConsulClient::new("https://consul.example.com/prefix").unwrap();
        assert_eq!(
            client.url(&["v1", "status", "leader"]).unwrap().as_str(),
            "https://consul.example.com/prefix/v1/status/leader"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            ConsulClient::new("http://"),
            Err(RegistryError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_register_sends_agent_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .and(body_json(json!({
                "ID": "web-abc123456789",
                "Name": "web",
                "Address": "10.0.0.5",
                "Port": 80,
                "Tags": ["traefik.enable=true", "registrar_id=node-1"],
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = ConsulClient::new(&server.uri()).unwrap();
        client.register(&service()).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_reports_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/register"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ConsulClient::new(&server.uri()).unwrap();
        let err = client.register(&service()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_deregister() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/agent/service/deregister/web-abc123456789"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = ConsulClient::new(&server.uri()).unwrap();
        client.deregister("web-abc123456789").await.unwrap();
    }

    #[tokio::test]
    async fn test_services_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/agent/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "web-abc123456789": {
                    "ID": "web-abc123456789",
                    "Service": "web",
                    "Tags": ["registrar_id=node-1"],
                    "Address": "10.0.0.5",
                    "Port": 80,
                    "Meta": {},
                    "Weights": {"Passing": 1, "Warning": 1}
                },
                "consul-ui": {
                    "ID": "consul-ui",
                    "Service": "consul-ui",
                    "Tags": null,
                    "Address": "",
                    "Port": 8500
                }
            })))
            .mount(&server)
            .await;

        let client = ConsulClient::new(&server.uri()).unwrap();
        let services = client.services().await.unwrap();
        assert_eq!(services.len(), 2);
        let web = &services["web-abc123456789"];
        assert_eq!(web.name, "web");
        assert_eq!(web.address, "10.0.0.5");
        assert!(web.has_tag("registrar_id=node-1"));
        assert!(services["consul-ui"].tags.is_empty());
    }

    #[tokio::test]
    async fn test_ping_checks_leader() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/status/leader"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("10.0.0.2:8300")))
            .mount(&server)
            .await;

        let client = ConsulClient::new(&server.uri()).unwrap();
        assert_eq!(client.leader().await.unwrap(), "10.0.0.2:8300");
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_fails_without_leader() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/status/leader"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("")))
            .mount(&server)
            .await;

        let client = ConsulClient::new(&server.uri()).unwrap();
        assert!(client.ping().await.is_err());
    }
}
