//! Error types for traefik-dns.

use thiserror::Error;

/// Errors that can occur while setting up or running the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Docker client error
    #[error("Docker client error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// HTTP client error (from the Traefik API client initialization)
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

/// Failure of a single resolution attempt.
///
/// Every variant aborts the query; the authority reports it and defers the
/// query to the next authority in the chain.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Running containers could not be listed.
    #[error("failed to get running containers: {0}")]
    Discovery(#[source] bollard::errors::Error),

    /// A network attachment carries an address that is not an IP literal.
    #[error("network {network} has invalid address {address:?}")]
    InvalidAddress {
        /// Network name.
        network: String,
        /// Raw address reported by the runtime.
        address: String,
    },

    /// The subnet of a network attachment could not be derived.
    #[error("failed to derive subnet of network {network}: {source}")]
    Subnet {
        /// Network name.
        network: String,
        /// Underlying parse failure.
        #[source]
        source: SubnetError,
    },

    /// The proxy router list could not be fetched.
    #[error("failed to check if host {endpoint} has domain {domain}: {source}")]
    Routers {
        /// Proxy API endpoint (`ip:port`).
        endpoint: String,
        /// Comparison domain of the query.
        domain: String,
        /// Underlying proxy failure.
        #[source]
        source: ProxyError,
    },

    /// The proxy service descriptor could not be fetched.
    #[error("failed to get service {service} from host {endpoint}: {source}")]
    Service {
        /// Proxy API endpoint (`ip:port`).
        endpoint: String,
        /// Service name queried.
        service: String,
        /// Underlying proxy failure.
        #[source]
        source: ProxyError,
    },

    /// A load-balancer server URL does not carry an IP literal.
    #[error("service {service} has server url {url:?} without an ip address")]
    ServerUrl {
        /// Service name the server belongs to.
        service: String,
        /// Offending URL.
        url: String,
    },
}

impl ResolveError {
    /// Short stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::Discovery(_) => "discovery",
            ResolveError::InvalidAddress { .. } => "address",
            ResolveError::Subnet { .. } => "subnet",
            ResolveError::Routers { .. } => "routers",
            ResolveError::Service { .. } | ResolveError::ServerUrl { .. } => "service",
        }
    }

    /// Identity of the failure for rate-limited reporting.
    ///
    /// Same as the message, except that router failures leave out the
    /// queried domain: a proxy that is down fails every name alike.
    pub fn suppression_key(&self) -> String {
        match self {
            ResolveError::Routers {
                endpoint, source, ..
            } => format!("failed to list routers of host {}: {}", endpoint, source),
            other => other.to_string(),
        }
    }
}

/// Errors talking to the Traefik API.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Transport failure (connect, timeout, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The response body was not the expected JSON document.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request URL could not be built.
    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors deriving a subnet from gateway and prefix length.
#[derive(Debug, Error)]
pub enum SubnetError {
    /// Gateway is not an IP literal.
    #[error("invalid gateway {gateway:?}: {source}")]
    Gateway {
        /// Raw gateway string.
        gateway: String,
        /// Parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// Prefix length out of range for the gateway's address family.
    #[error("invalid prefix length {prefix_len} (max {max})")]
    PrefixLen {
        /// Reported prefix length.
        prefix_len: i64,
        /// Maximum for the address family.
        max: u8,
    },
}
