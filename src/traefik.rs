//! Traefik HTTP API client.
//!
//! Only two endpoints are used:
//!
//! ```text
//! GET /api/http/routers            -> [{"name": "...", "rule": "Host(`a.local`)", "service": "..."}]
//! GET /api/http/services/{name}    -> {"loadBalancer": {"servers": [{"url": "http://172.18.0.3:80"}]}}
//! ```

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::trace;
use url::Url;

use crate::error::ProxyError;
use crate::metrics;

static HOST_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Host\(`(.+)`\)").expect("host rule pattern is valid"));

static SERVER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^:/]+://(?:\[([^\]]+)\]|([^:/\[\]]+))(?::\d+)?(?:/.*)?$")
        .expect("server url pattern is valid")
});

/// A router as reported by `/api/http/routers`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Router {
    /// Router name, usually `<name>@<provider>`.
    #[serde(default)]
    pub name: String,
    /// Rule expression, e.g. ``Host(`whoami.local`)``.
    #[serde(default)]
    pub rule: String,
    /// Service the router forwards to.
    #[serde(default)]
    pub service: String,
}

impl Router {
    /// Domain captured by a ``Host(`…`)`` rule, if the rule has that form.
    pub fn host(&self) -> Option<&str> {
        host_rule_domain(&self.rule)
    }

    /// Service name as accepted by the services endpoint.
    ///
    /// Routers list their service without the provider suffix, so the
    /// router's own `@provider` is appended when the service has none.
    pub fn qualified_service(&self) -> String {
        if self.service.contains('@') {
            return self.service.clone();
        }
        match self.name.rsplit_once('@') {
            Some((_, provider)) if !provider.is_empty() => {
                format!("{}@{}", self.service, provider)
            }
            _ => self.service.clone(),
        }
    }
}

/// A service as reported by `/api/http/services/{name}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Load balancer configuration; absent for weighted/mirroring services.
    #[serde(default)]
    pub load_balancer: Option<LoadBalancer>,
}

impl ServiceInfo {
    /// Server URLs in the order Traefik reports them.
    pub fn server_urls(&self) -> impl Iterator<Item = &str> {
        self.load_balancer
            .iter()
            .flat_map(|lb| lb.servers.iter().map(|s| s.url.as_str()))
    }
}

/// Load balancer section of a service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadBalancer {
    /// Backend servers.
    #[serde(default)]
    pub servers: Vec<Server>,
}

/// A single load balancer backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Server {
    /// Backend URL, e.g. `http://172.18.0.3:80`.
    #[serde(default)]
    pub url: String,
}

/// Extract the domain of a ``Host(`…`)`` rule.
pub fn host_rule_domain(rule: &str) -> Option<&str> {
    HOST_RULE
        .captures(rule)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Extract the IP literal of a `scheme://ip[:port][/path]` server URL.
///
/// Any scheme is accepted. The host must be a literal address, IPv6 in
/// brackets; names and shorthand forms like `1.2.3` yield `None`.
pub fn server_ip(url: &str) -> Option<IpAddr> {
    let caps = SERVER_URL.captures(url)?;
    if let Some(bracketed) = caps.get(1) {
        return bracketed.as_str().parse::<Ipv6Addr>().ok().map(IpAddr::V6);
    }
    caps.get(2)?.as_str().parse().ok()
}

/// Read access to a reverse proxy's routing configuration.
#[async_trait]
pub trait ProxyApi: Send + Sync {
    /// List HTTP routers of the proxy listening at `endpoint`.
    async fn routers(&self, endpoint: SocketAddr) -> Result<Vec<Router>, ProxyError>;

    /// Fetch the HTTP service `name` of the proxy listening at `endpoint`.
    async fn service(&self, endpoint: SocketAddr, name: &str) -> Result<ServiceInfo, ProxyError>;
}

/// [`ProxyApi`] backed by Traefik's API over plain HTTP.
#[derive(Debug, Clone)]
pub struct TraefikClient {
    http: reqwest::Client,
}

impl TraefikClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self { http })
    }

    fn base_url(endpoint: SocketAddr) -> Result<Url, ProxyError> {
        Ok(Url::parse(&format!("http://{}/", endpoint))?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ProxyError> {
        trace!(%url, "traefik api request");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ProxyApi for TraefikClient {
    async fn routers(&self, endpoint: SocketAddr) -> Result<Vec<Router>, ProxyError> {
        metrics::record_proxy_call("routers");
        let url = Self::base_url(endpoint)?.join("api/http/routers")?;
        self.get_json(url).await
    }

    async fn service(&self, endpoint: SocketAddr, name: &str) -> Result<ServiceInfo, ProxyError> {
        metrics::record_proxy_call("service");
        let mut url = Self::base_url(endpoint)?;
        url.path_segments_mut()
            .map_err(|()| ProxyError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .clear()
            .extend(["api", "http", "services", name]);
        self.get_json(url).await
    }
}
