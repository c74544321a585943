//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registry_registrations_total` (counter): by kind, outcome
//! - `registry_matches_total` (counter): by outcome
//! - `registry_retrievals_total` (counter): by outcome
//! - `registry_urgency_updates_total` (counter): by outcome
//! - `registry_http_requests_total` (counter): by method, status
//! - `registry_http_request_duration_seconds` (histogram)
//! - `registry_ledger_call_duration_seconds` (histogram): by op, backend
//! - `registry_donors` / `registry_recipients` (gauges)
//! - `registry_ledger_health` (gauge): 1=healthy, 0=unhealthy, by backend
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - Labels stay low-cardinality: never ids or addresses

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_registration(kind: &'static str, ok: bool) {
    ::metrics::counter!("registry_registrations_total", "kind" => kind, "outcome" => outcome(ok))
        .increment(1);
}

pub fn record_match(ok: bool) {
    ::metrics::counter!("registry_matches_total", "outcome" => outcome(ok)).increment(1);
}

pub fn record_retrieval(ok: bool) {
    ::metrics::counter!("registry_retrievals_total", "outcome" => outcome(ok)).increment(1);
}

pub fn record_urgency_update(ok: bool) {
    ::metrics::counter!("registry_urgency_updates_total", "outcome" => outcome(ok)).increment(1);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "registry_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("registry_http_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

pub fn record_ledger_call(op: &'static str, backend: &'static str, start: Instant) {
    ::metrics::histogram!(
        "registry_ledger_call_duration_seconds",
        "op" => op,
        "backend" => backend
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_population(donors: usize, recipients: usize) {
    ::metrics::gauge!("registry_donors").set(donors as f64);
    ::metrics::gauge!("registry_recipients").set(recipients as f64);
}

pub fn record_ledger_health(backend: &'static str, healthy: bool) {
    ::metrics::gauge!("registry_ledger_health", "backend" => backend)
        .set(if healthy { 1.0 } else { 0.0 });
}
