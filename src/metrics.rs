//! Metrics instrumentation for traefik-dns.
//!
//! All metrics are prefixed with `traefik_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query handled by the resolver.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::NoMatch => "no_match",
        QueryResult::Unsupported => "unsupported",
        QueryResult::Error => "error",
    };

    counter!("traefik_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("traefik_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// A backend was confirmed and an answer synthesized.
    Answered,
    /// No router matched; deferred to the next authority.
    NoMatch,
    /// Record type not served; deferred without resolving.
    Unsupported,
    /// Resolution failed; deferred to the next authority.
    Error,
}

/// Record a failed resolution by error kind.
pub fn record_resolve_error(kind: &'static str) {
    counter!("traefik_dns.resolve.error.count", "kind" => kind).increment(1);
}

/// Record an error log line that was suppressed.
pub fn record_error_suppressed() {
    counter!("traefik_dns.error.suppressed.count").increment(1);
}

/// Record the number of distinct failures held by the error reporter.
pub fn record_tracked_errors(count: usize) {
    gauge!("traefik_dns.error.tracked_keys").set(count as f64);
}

/// Record a call to the Traefik API.
pub fn record_proxy_call(endpoint: &'static str) {
    counter!("traefik_dns.proxy.request.count", "endpoint" => endpoint).increment(1);
}

/// Record containers carrying the discovery label, per query.
pub fn record_candidates(count: usize) {
    histogram!("traefik_dns.query.candidates").record(count as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
