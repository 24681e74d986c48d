//! Docker Engine client

use crate::error::{Result, RuntimeError};
use bollard::{Docker, API_DEFAULT_VERSION};
use tracing::info;

/// Request timeout, in seconds, for Docker API calls
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// DockerClient wraps the Docker API client used by the registrar
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect to the Docker daemon.
    ///
    /// `endpoint` may be `unix://<path>`, `tcp://<host:port>` or
    /// `http://<host:port>`; without one the local defaults (socket path or
    /// `DOCKER_HOST`) are used.
    pub fn connect(endpoint: Option<&str>) -> Result<Self> {
        let docker = match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
            None => {
                let docker = Docker::connect_with_local_defaults()?;
                info!("Connecting to Docker via local socket");
                docker
            }
            Some(endpoint) => {
                let docker = if let Some(path) = endpoint.strip_prefix("unix://") {
                    Docker::connect_with_socket(path, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)?
                } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
                    Docker::connect_with_http(endpoint, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)?
                } else {
                    return Err(RuntimeError::InvalidEndpoint(endpoint.to_string()));
                };
                info!("Connecting to Docker at {}", endpoint);
                docker
            }
        };

        Ok(Self { docker })
    }

    /// Get the underlying Docker client
    pub fn inner(&self) -> &Docker {
        &self.docker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_scheme() {
        assert!(matches!(
            DockerClient::connect(Some("ftp://docker:2375")),
            Err(RuntimeError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_tcp_endpoint_does_not_connect_eagerly() {
        assert!(DockerClient::connect(Some("tcp://127.0.0.1:2375")).is_ok());
    }
}
