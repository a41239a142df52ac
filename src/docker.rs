//! Container discovery through the Docker Engine API.

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EndpointSettings};
use bollard::{Docker, API_DEFAULT_VERSION};
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::debug;

use crate::error::ResolveError;

/// A running container as seen by the resolver.
#[derive(Debug, Clone, Default)]
pub struct Container {
    /// Container ID.
    pub id: String,
    /// Container labels.
    pub labels: HashMap<String, String>,
    /// Network attachments, ordered by network name.
    pub networks: Vec<NetworkAttachment>,
}

/// A container's attachment to one network.
///
/// Address fields are kept as reported by the runtime; they are parsed when a
/// query needs them so malformed values surface as resolution errors.
#[derive(Debug, Clone, Default)]
pub struct NetworkAttachment {
    /// Network name (e.g. `bridge`).
    pub name: String,
    /// IPv4 address of the container on this network. Empty if none.
    pub address: String,
    /// Gateway of the network.
    pub gateway: String,
    /// Prefix length of the network.
    pub prefix_len: i64,
    /// Global IPv6 address, if the network has IPv6 enabled.
    pub ipv6_address: Option<Ipv6Addr>,
}

impl NetworkAttachment {
    fn from_endpoint(name: String, endpoint: EndpointSettings) -> Self {
        Self {
            name,
            address: endpoint.ip_address.unwrap_or_default(),
            gateway: endpoint.gateway.unwrap_or_default(),
            prefix_len: endpoint.ip_prefix_len.unwrap_or_default(),
            ipv6_address: endpoint
                .global_ipv6_address
                .filter(|a| !a.is_empty())
                .and_then(|a| a.parse().ok()),
        }
    }
}

impl From<ContainerSummary> for Container {
    fn from(summary: ContainerSummary) -> Self {
        let mut networks: Vec<NetworkAttachment> = summary
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| NetworkAttachment::from_endpoint(name, endpoint))
            .collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            id: summary.id.unwrap_or_default(),
            labels: summary.labels.unwrap_or_default(),
            networks,
        }
    }
}

/// Source of currently running containers.
#[async_trait]
pub trait ContainerSource: Send + Sync {
    /// List running containers with their labels and network attachments.
    async fn running_containers(&self) -> Result<Vec<Container>, ResolveError>;
}

/// [`ContainerSource`] backed by a Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerSource {
    docker: Docker,
}

impl DockerSource {
    /// Connect to the daemon at `host`, or to the local default when `None`.
    ///
    /// Accepts `unix://` socket paths and `tcp://` or `http://` addresses.
    /// Connecting is lazy; no request is made until the first call.
    pub fn connect(host: Option<&str>, timeout: Duration) -> Result<Self, bollard::errors::Error> {
        let timeout_secs = timeout.as_secs().max(1);
        let docker = match host {
            #[cfg(unix)]
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, timeout_secs, API_DEFAULT_VERSION)?
            }
            Some(host) => Docker::connect_with_http(host, timeout_secs, API_DEFAULT_VERSION)?,
            None => Docker::connect_with_local_defaults()?,
        };

        Ok(Self {
            docker: docker.with_timeout(timeout),
        })
    }

    /// Check the daemon is reachable.
    pub async fn ping(&self) -> Result<(), bollard::errors::Error> {
        self.docker.ping().await.map(|_| ())
    }
}

#[async_trait]
impl ContainerSource for DockerSource {
    async fn running_containers(&self) -> Result<Vec<Container>, ResolveError> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(ResolveError::Discovery)?;

        debug!(count = summaries.len(), "listed running containers");
        Ok(summaries.into_iter().map(Container::from).collect())
    }
}
