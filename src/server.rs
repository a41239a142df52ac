//! DNS server setup and lifecycle management.

use hickory_proto::rr::{LowerName, Name};
use hickory_resolver::config::NameServerConfigGroup;
use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::store::forwarder::{ForwardAuthority, ForwardConfig};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::authority::TraefikAuthority;
use crate::config::DnsConfig;
use crate::docker::DockerSource;
use crate::error::DnsError;
use crate::report::ErrorReporter;
use crate::resolver::Resolver;
use crate::traefik::TraefikClient;
use crate::window::WindowConfig;

/// Build the authority forwarding everything the resolver skips to `upstreams`.
fn build_forwarder(config: &DnsConfig) -> Result<Option<Arc<dyn AuthorityObject>>, DnsError> {
    let mut upstreams = config.upstreams.iter();
    let Some(first) = upstreams.next() else {
        return Ok(None);
    };

    let mut name_servers = NameServerConfigGroup::from_ips_clear(&[first.ip()], first.port(), true);
    for upstream in upstreams {
        name_servers.merge(NameServerConfigGroup::from_ips_clear(
            &[upstream.ip()],
            upstream.port(),
            true,
        ));
    }

    let forward_config = ForwardConfig {
        name_servers,
        options: None,
    };
    let forwarder = ForwardAuthority::builder_tokio(forward_config)
        .with_origin(Name::root())
        .build()
        .map_err(DnsError::Config)?;

    Ok(Some(Arc::new(forwarder)))
}

/// DNS server answering from Traefik routers, forwarding everything else.
pub struct DnsServer {
    config: DnsConfig,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(config: DnsConfig) -> Self {
        Self { config }
    }

    /// Server configuration.
    pub fn config(&self) -> &DnsConfig {
        &self.config
    }

    /// Build the catalog: the resolver first, then the upstream forwarder.
    async fn build_catalog(&self) -> Result<Catalog, DnsError> {
        let timeout = self.config.request_timeout();

        let docker = DockerSource::connect(self.config.docker_host.as_deref(), timeout)?;
        if let Err(e) = docker.ping().await {
            error!("cannot connect to docker daemon: {}", e);
        }

        let proxy = TraefikClient::new(timeout)?;
        let resolver = Resolver::new(Arc::new(docker), Arc::new(proxy))
            .with_discovery_label(self.config.discovery_label.clone());
        let reporter = ErrorReporter::new(WindowConfig::from(&self.config.error_suppression));

        let authority: Arc<dyn AuthorityObject> =
            Arc::new(TraefikAuthority::new(resolver, reporter, self.config.ttl));
        let mut chain = vec![authority];

        match build_forwarder(&self.config)? {
            Some(forwarder) => {
                info!(upstreams = ?self.config.upstreams, "forwarding unmatched queries");
                chain.push(forwarder);
            }
            None => warn!("no upstreams configured, unmatched queries will fail"),
        }

        let mut catalog = Catalog::new();
        catalog.upsert(LowerName::from(Name::root()), chain);
        Ok(catalog)
    }

    /// Run the DNS server until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        self.config.validate()?;

        info!(
            listen_addr = %self.config.listen_addr,
            discovery_label = %self.config.discovery_label,
            docker_host = ?self.config.docker_host,
            "Starting traefik-dns server"
        );

        let catalog = self.build_catalog().await?;

        // Create server
        let mut server = ServerFuture::new(catalog);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, Duration::from_secs(30));

        info!("DNS server ready to serve queries");

        // Run server until shutdown
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        info!("DNS server stopped");
        Ok(())
    }
}
