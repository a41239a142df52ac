//! Hickory DNS authority answering from the resolver.
//!
//! The authority serves the root zone as one link of a catalog chain: a
//! confirmed backend ends the chain with an answer, anything else (no
//! match, unsupported type, resolution error) skips to the next authority.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupOptions, LookupRecords, MessageRequest, UpdateResult,
    ZoneType,
};
use hickory_server::server::RequestInfo;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::metrics::{self, QueryResult, Timer};
use crate::report::ErrorReporter;
use crate::resolver::Resolver;

/// Authority backed by Traefik routers discovered through Docker.
pub struct TraefikAuthority {
    origin: LowerName,
    resolver: Resolver,
    reporter: ErrorReporter,
    ttl: u32,
}

impl TraefikAuthority {
    /// Create an authority for the root zone.
    pub fn new(resolver: Resolver, reporter: ErrorReporter, ttl: u32) -> Self {
        Self {
            origin: LowerName::from(Name::root()),
            resolver,
            reporter,
            ttl,
        }
    }

    /// Build the single-record answer for `name`.
    fn build_record(&self, name: Name, ip: IpAddr) -> RecordSet {
        let (rtype, rdata) = match ip {
            IpAddr::V4(v4) => (RecordType::A, RData::A(A::from(v4))),
            IpAddr::V6(v6) => (RecordType::AAAA, RData::AAAA(AAAA::from(v6))),
        };

        let mut record_set = RecordSet::new(name.clone(), rtype, 0);
        let mut record = Record::from_rdata(name, self.ttl, rdata);
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);

        record_set
    }
}

#[async_trait]
impl Authority for TraefikAuthority {
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
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        if !matches!(rtype, RecordType::A | RecordType::AAAA) {
            trace!(name = %name, rtype = ?rtype, "Unsupported record type");
            metrics::record_query(&rtype_str, QueryResult::Unsupported, timer.elapsed());
            return LookupControlFlow::Skip;
        }

        let name_str = name.to_string();
        let backend = match self.resolver.resolve(&name_str).await {
            Ok(Some(backend)) => backend,
            Ok(None) => {
                trace!(name = %name_str, "no router matches");
                metrics::record_query(&rtype_str, QueryResult::NoMatch, timer.elapsed());
                return LookupControlFlow::Skip;
            }
            Err(e) => {
                self.reporter.report(&e);
                metrics::record_query(&rtype_str, QueryResult::Error, timer.elapsed());
                return LookupControlFlow::Skip;
            }
        };

        let Some(ip) = backend.address_for(rtype) else {
            debug!(name = %name_str, rtype = ?rtype, address = %backend.address, "backend has no address of this type");
            metrics::record_query(&rtype_str, QueryResult::NoMatch, timer.elapsed());
            return LookupControlFlow::Skip;
        };

        debug!(name = %name_str, rtype = ?rtype, %ip, "answering");
        metrics::record_query(&rtype_str, QueryResult::Answered, timer.elapsed());

        let mut fqdn = Name::from(name.clone());
        fqdn.set_fqdn(true);
        let record_set = Arc::new(self.build_record(fqdn, ip));
        LookupControlFlow::Break(Ok(LookupRecords::new(lookup_options, record_set)))
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
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
        // DNSSEC not supported
        LookupControlFlow::Skip
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
