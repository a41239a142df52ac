//! Shared test infrastructure for catalog integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, RecordSet, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{
    Authority, AuthorityObject, Catalog, LookupControlFlow, LookupOptions, LookupRecords,
    MessageRequest, MessageResponse, UpdateResult, ZoneType,
};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use traefik_dns::docker::{Container, ContainerSource, NetworkAttachment};
use traefik_dns::error::{ProxyError, ResolveError};
use traefik_dns::traefik::{LoadBalancer, ProxyApi, Router, Server, ServiceInfo};
use traefik_dns::{ErrorReporter, Resolver, TraefikAuthority, WindowConfig};

// --- Constants ---

/// Address answered by the fallback authority for every A query.
pub const FALLBACK_IP: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 53);
pub const TRAEFIK_IP: Ipv4Addr = Ipv4Addr::new(172, 18, 0, 2);

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Fakes ---

/// In-memory container list, counting calls.
#[derive(Default)]
pub struct FakeContainers {
    pub containers: Vec<Container>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeContainers {
    pub fn new(containers: Vec<Container>) -> Self {
        Self {
            containers,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerSource for FakeContainers {
    async fn running_containers(&self) -> Result<Vec<Container>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ResolveError::Discovery(
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 500,
                    message: "Cannot connect to the Docker daemon".to_string(),
                },
            ));
        }
        Ok(self.containers.clone())
    }
}

/// In-memory Traefik API keyed by endpoint.
#[derive(Default)]
pub struct FakeTraefik {
    routers: HashMap<SocketAddr, Vec<Router>>,
    services: HashMap<(SocketAddr, String), ServiceInfo>,
    pub router_calls: Mutex<Vec<SocketAddr>>,
}

impl FakeTraefik {
    /// Add a `Host(...)` router for `domain` whose service has the given servers.
    pub fn route(mut self, endpoint: SocketAddr, domain: &str, servers: &[&str]) -> Self {
        let name = domain.split('.').next().unwrap_or(domain).to_string();
        self.routers.entry(endpoint).or_default().push(Router {
            name: format!("{}@docker", name),
            rule: format!("Host(`{}`)", domain),
            service: name.clone(),
        });
        self.services.insert(
            (endpoint, format!("{}@docker", name)),
            ServiceInfo {
                load_balancer: Some(LoadBalancer {
                    servers: servers
                        .iter()
                        .map(|url| Server {
                            url: url.to_string(),
                        })
                        .collect(),
                }),
            },
        );
        self
    }

    pub fn router_calls(&self) -> Vec<SocketAddr> {
        self.router_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProxyApi for FakeTraefik {
    async fn routers(&self, endpoint: SocketAddr) -> Result<Vec<Router>, ProxyError> {
        self.router_calls.lock().unwrap().push(endpoint);
        self.routers
            .get(&endpoint)
            .cloned()
            .ok_or_else(|| ProxyError::Status {
                url: format!("http://{}/api/http/routers", endpoint),
                status: 502,
            })
    }

    async fn service(&self, endpoint: SocketAddr, name: &str) -> Result<ServiceInfo, ProxyError> {
        self.services
            .get(&(endpoint, name.to_string()))
            .cloned()
            .ok_or_else(|| ProxyError::Status {
                url: format!("http://{}/api/http/services/{}", endpoint, name),
                status: 404,
            })
    }
}

/// A container labelled with the discovery port, attached to one network.
pub fn traefik_container(address: Ipv4Addr, gateway: &str, prefix_len: i64) -> Container {
    Container {
        id: format!("traefik-{}", address),
        labels: HashMap::from([("coredns.traefik.port".to_string(), "8080".to_string())]),
        networks: vec![NetworkAttachment {
            name: "web".to_string(),
            address: address.to_string(),
            gateway: gateway.to_string(),
            prefix_len,
            ipv6_address: None,
        }],
    }
}

/// A container without the discovery label.
pub fn plain_container(address: Ipv4Addr) -> Container {
    Container {
        id: format!("plain-{}", address),
        labels: HashMap::from([("traefik.enable".to_string(), "true".to_string())]),
        networks: vec![NetworkAttachment {
            name: "web".to_string(),
            address: address.to_string(),
            gateway: "172.18.0.1".to_string(),
            prefix_len: 16,
            ipv6_address: None,
        }],
    }
}

pub fn endpoint(ip: Ipv4Addr) -> SocketAddr {
    SocketAddr::from((ip, 8080))
}

// --- Fallback authority ---

/// Next link in the chain: answers every A query with [`FALLBACK_IP`].
pub struct FallbackAuthority {
    origin: LowerName,
}

impl FallbackAuthority {
    pub fn new() -> Self {
        Self {
            origin: LowerName::from(Name::root()),
        }
    }
}

#[async_trait]
impl Authority for FallbackAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::External
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        if rtype != RecordType::A {
            return LookupControlFlow::Break(Err(
                hickory_server::authority::LookupError::ResponseCode(ResponseCode::NXDomain),
            ));
        }
        let name = Name::from(name.clone());
        let mut record_set = RecordSet::new(name.clone(), RecordType::A, 0);
        let mut record = Record::from_rdata(name, 300, RData::A(A::from(FALLBACK_IP)));
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);
        LookupControlFlow::Break(Ok(LookupRecords::new(
            lookup_options,
            Arc::new(record_set),
        )))
    }

    async fn search(
        &self,
        request_info: hickory_server::server::RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        Authority::lookup(
            self,
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Skip
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}

// --- Catalog construction ---

pub fn test_reporter() -> ErrorReporter {
    ErrorReporter::new(WindowConfig {
        capacity: 5,
        window: Duration::from_secs(300),
        cooldown: Duration::from_secs(3600),
    })
}

/// Build a Catalog chaining a TraefikAuthority and a FallbackAuthority.
pub fn build_catalog(
    containers: Arc<FakeContainers>,
    traefik: Arc<FakeTraefik>,
    reporter: ErrorReporter,
) -> Catalog {
    let resolver = Resolver::new(containers, traefik);
    let authority: Arc<dyn AuthorityObject> =
        Arc::new(TraefikAuthority::new(resolver, reporter, 0));
    let fallback: Arc<dyn AuthorityObject> = Arc::new(FallbackAuthority::new());

    let mut catalog = Catalog::new();
    catalog.upsert(LowerName::from(Name::root()), vec![authority, fallback]);
    catalog
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Build a full `Request` from a client address.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let mut decoder = BinDecoder::new(&bytes);
    let msg = MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest");
    let src: SocketAddr = "10.0.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(
    catalog: &Catalog,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Assert response is successful with exactly the expected A addresses.
pub fn assert_a_response(msg: &Message, expected: &[Ipv4Addr]) {
    assert_eq!(
        msg.response_code(),
        ResponseCode::NoError,
        "expected NoError, got {:?}",
        msg.response_code()
    );
    assert_eq!(extract_a_ips(msg), expected);
}
