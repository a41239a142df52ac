//! Configuration types for traefik-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::DnsError;
use crate::resolver::DISCOVERY_LABEL;
use crate::window::WindowConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// TTL for synthesized records in seconds.
    #[serde(default)]
    pub ttl: u32,

    /// Container label carrying the Traefik API port.
    #[serde(default = "default_discovery_label")]
    pub discovery_label: String,

    /// Docker daemon address (`unix:///var/run/docker.sock`, `tcp://host:2375`).
    /// Defaults to the local daemon, honouring `DOCKER_HOST`.
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Upstream resolvers queried for names the resolver does not claim.
    #[serde(default)]
    pub upstreams: Vec<SocketAddr>,

    /// Timeout for each Docker and Traefik API call, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Error log suppression.
    #[serde(default)]
    pub error_suppression: ErrorSuppressionConfig,
}

/// Error log suppression configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSuppressionConfig {
    /// Occurrences of the same error within the window before it is muted.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Mute duration in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "traefik_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            ttl: 0,
            discovery_label: default_discovery_label(),
            docker_host: None,
            upstreams: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
            error_suppression: ErrorSuppressionConfig::default(),
        }
    }
}

impl Default for ErrorSuppressionConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            window_secs: default_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl DnsConfig {
    /// Check values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.discovery_label.trim().is_empty() {
            return Err(DnsError::Config("discovery_label must not be empty".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(DnsError::Config("request_timeout_ms must be positive".into()));
        }
        let suppression = &self.error_suppression;
        if suppression.capacity == 0 {
            return Err(DnsError::Config(
                "error_suppression.capacity must be positive".into(),
            ));
        }
        if suppression.window_secs == 0 || suppression.cooldown_secs == 0 {
            return Err(DnsError::Config(
                "error_suppression durations must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Timeout applied to each external call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl From<&ErrorSuppressionConfig> for WindowConfig {
    fn from(config: &ErrorSuppressionConfig) -> Self {
        WindowConfig {
            capacity: config.capacity,
            window: Duration::from_secs(config.window_secs),
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_discovery_label() -> String {
    DISCOVERY_LABEL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_capacity() -> usize {
    5
}

fn default_window_secs() -> u64 {
    300
}

fn default_cooldown_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}
