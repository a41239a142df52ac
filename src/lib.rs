//! traefik-dns - A DNS resolver answering service hostnames from Traefik routers.
//!
//! Containers running Traefik opt in with a label holding the port of the
//! Traefik API. For each query the resolver asks those Traefik instances
//! whether one of their routers claims the name and answers with the
//! address of the Traefik container on the network that reaches the backend.
//! Everything else is forwarded upstream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          traefik-dns                             │
//! │                                                                  │
//! │  UDP/TCP ──▶ Catalog (root zone)                                 │
//! │  :53          │                                                  │
//! │               ├─▶ TraefikAuthority ──▶ Resolver ──▶ Docker API   │
//! │               │        │ skip              │                     │
//! │               │        ▼                   └──────▶ Traefik API  │
//! │               └─▶ ForwardAuthority ──▶ upstreams                 │
//! │                                                                  │
//! │  resolution errors ──▶ ErrorReporter ──▶ OccurrenceWindow        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! whoami.local A
//!   → containers labelled coredns.traefik.port=8080
//!   → GET http://172.18.0.2:8080/api/http/routers   (rule Host(`whoami.local`))
//!   → GET http://172.18.0.2:8080/api/http/services/whoami@docker
//!   → server http://172.18.0.3:80 lies in 172.18.0.0/16
//!   → whoami.local. A 172.18.0.2
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use traefik_dns::{DnsConfig, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DnsConfig {
//!         listen_addr: "127.0.0.1:5353".parse().unwrap(),
//!         upstreams: vec!["1.1.1.1:53".parse().unwrap()],
//!         ..Default::default()
//!     };
//!
//!     let shutdown = CancellationToken::new();
//!     let server = DnsServer::new(config);
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod config;
pub mod docker;
pub mod error;
pub mod metrics;
pub mod report;
pub mod resolver;
pub mod server;
pub mod subnet;
pub mod telemetry;
pub mod traefik;
pub mod window;

// Re-export main types
pub use authority::TraefikAuthority;
pub use config::{Config, DnsConfig, ErrorSuppressionConfig, TelemetryConfig};
pub use error::{DnsError, ResolveError};
pub use report::ErrorReporter;
pub use resolver::{Backend, Resolver};
pub use server::DnsServer;
pub use window::{OccurrenceWindow, WindowConfig};
