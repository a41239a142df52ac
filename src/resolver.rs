//! Dynamic resolution of service hostnames to container addresses.
//!
//! ```text
//! whoami.local.
//!   → running containers labelled `coredns.traefik.port=<port>`
//!   → for each network of such a container:
//!       GET http://<network address>:<port>/api/http/routers
//!       → router with rule Host(`whoami.local`)
//!       → GET /api/http/services/<service>
//!       → first server IP inside the network's subnet confirms the match
//!   → answer with the container's address on that network
//! ```
//!
//! Any failed step aborts the whole resolution; there is no retry and no
//! caching, every query sees the current containers and routers.

use hickory_proto::rr::RecordType;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::docker::{Container, ContainerSource, NetworkAttachment};
use crate::error::ResolveError;
use crate::metrics;
use crate::subnet::Subnet;
use crate::traefik::{server_ip, ProxyApi};

/// Container label holding the port of the Traefik API.
pub const DISCOVERY_LABEL: &str = "coredns.traefik.port";

/// A confirmed backend for a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Container running the proxy.
    pub container_id: String,
    /// Network the match was confirmed on.
    pub network: String,
    /// Router whose rule matched.
    pub router: String,
    /// Address of the container on that network.
    pub address: IpAddr,
    /// Global IPv6 address of the container on that network, if any.
    pub ipv6_address: Option<Ipv6Addr>,
}

impl Backend {
    /// Address to answer with for `rtype`, or `None` if the type is not served.
    ///
    /// AAAA prefers the network's global IPv6 address and otherwise answers
    /// with the IPv4-mapped form of the network address.
    pub fn address_for(&self, rtype: RecordType) -> Option<IpAddr> {
        match (rtype, self.address) {
            (RecordType::A, IpAddr::V4(_)) => Some(self.address),
            (RecordType::A, IpAddr::V6(_)) => None,
            (RecordType::AAAA, address) => {
                let v6 = self.ipv6_address.unwrap_or(match address {
                    IpAddr::V4(v4) => v4.to_ipv6_mapped(),
                    IpAddr::V6(v6) => v6,
                });
                Some(IpAddr::V6(v6))
            }
            _ => None,
        }
    }
}

/// Resolves hostnames through container labels and Traefik routers.
#[derive(Clone)]
pub struct Resolver {
    containers: Arc<dyn ContainerSource>,
    proxy: Arc<dyn ProxyApi>,
    discovery_label: String,
}

impl Resolver {
    /// Create a resolver using the default discovery label.
    pub fn new(containers: Arc<dyn ContainerSource>, proxy: Arc<dyn ProxyApi>) -> Self {
        Self {
            containers,
            proxy,
            discovery_label: DISCOVERY_LABEL.to_string(),
        }
    }

    /// Use a different discovery label.
    pub fn with_discovery_label(mut self, label: impl Into<String>) -> Self {
        self.discovery_label = label.into();
        self
    }

    /// Port of the proxy API advertised by `container`, if it opted in.
    pub fn discovery_port(&self, container: &Container) -> Option<u16> {
        container
            .labels
            .get(&self.discovery_label)
            .and_then(|value| value.trim().parse::<u16>().ok())
            .filter(|&port| port != 0)
    }

    /// Find the backend serving `name`.
    ///
    /// `Ok(None)` means no router claims the name and the query should be
    /// passed on.
    pub async fn resolve(&self, name: &str) -> Result<Option<Backend>, ResolveError> {
        let domain = name.strip_suffix('.').unwrap_or(name);

        let containers = self.containers.running_containers().await?;
        let candidates: Vec<(&Container, u16)> = containers
            .iter()
            .filter_map(|c| self.discovery_port(c).map(|port| (c, port)))
            .collect();
        metrics::record_candidates(candidates.len());
        trace!(
            domain,
            containers = containers.len(),
            candidates = candidates.len(),
            "resolving"
        );

        for (container, port) in candidates {
            for network in &container.networks {
                if let Some(backend) = self.check_network(container, network, port, domain).await? {
                    debug!(
                        domain,
                        container = %backend.container_id,
                        network = %backend.network,
                        router = %backend.router,
                        address = %backend.address,
                        "resolved backend"
                    );
                    return Ok(Some(backend));
                }
            }
        }

        Ok(None)
    }

    /// Ask the proxy reachable on `network` whether it routes `domain` to a
    /// server inside that network.
    async fn check_network(
        &self,
        container: &Container,
        network: &NetworkAttachment,
        port: u16,
        domain: &str,
    ) -> Result<Option<Backend>, ResolveError> {
        if network.address.is_empty() {
            trace!(container = %container.id, network = %network.name, "network has no address");
            return Ok(None);
        }

        let address: IpAddr =
            network
                .address
                .parse()
                .map_err(|_| ResolveError::InvalidAddress {
                    network: network.name.clone(),
                    address: network.address.clone(),
                })?;
        let subnet = Subnet::from_gateway(&network.gateway, network.prefix_len).map_err(
            |source| ResolveError::Subnet {
                network: network.name.clone(),
                source,
            },
        )?;
        let endpoint = SocketAddr::new(address, port);

        let routers = self
            .proxy
            .routers(endpoint)
            .await
            .map_err(|source| ResolveError::Routers {
                endpoint: endpoint.to_string(),
                domain: domain.to_string(),
                source,
            })?;

        let matching = routers
            .iter()
            .filter(|r| r.host().is_some_and(|host| host.eq_ignore_ascii_case(domain)));
        for router in matching {
            let service_name = router.qualified_service();
            let service = self
                .proxy
                .service(endpoint, &service_name)
                .await
                .map_err(|source| ResolveError::Service {
                    endpoint: endpoint.to_string(),
                    service: service_name.clone(),
                    source,
                })?;

            for url in service.server_urls() {
                let ip = server_ip(url).ok_or_else(|| ResolveError::ServerUrl {
                    service: service_name.clone(),
                    url: url.to_string(),
                })?;
                if subnet.contains(ip) {
                    return Ok(Some(Backend {
                        container_id: container.id.clone(),
                        network: network.name.clone(),
                        router: router.name.clone(),
                        address,
                        ipv6_address: network.ipv6_address,
                    }));
                }
            }

            trace!(
                router = %router.name,
                %subnet,
                "router matched but no server in network"
            );
        }

        Ok(None)
    }
}
