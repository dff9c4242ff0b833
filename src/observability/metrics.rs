//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (requests, latency, match sources, cache, fragments)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `ssr_requests_total` (counter): requests by route tag, status
//! - `ssr_request_duration_seconds` (histogram): time to response head
//! - `ssr_route_match_total` (counter): lookups by source (cache, tree, linear, none)
//! - `ssr_response_cache_total` (counter): hit, miss, bypass, store_error
//! - `ssr_fragments_total` (counter): resolved, rejected, discarded
//!
//! # Design Decisions
//! - Labels are low-cardinality: route tags, never raw paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(status: u16, route: &str, start: Instant) {
    metrics::counter!(
        "ssr_requests_total",
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    metrics::histogram!("ssr_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_match(source: &'static str) {
    metrics::counter!("ssr_route_match_total", "source" => source).increment(1);
}

pub fn record_cache(outcome: &'static str) {
    metrics::counter!("ssr_response_cache_total", "outcome" => outcome).increment(1);
}

pub fn record_fragment(outcome: &'static str) {
    metrics::counter!("ssr_fragments_total", "outcome" => outcome).increment(1);
}
