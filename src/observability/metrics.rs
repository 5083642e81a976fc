//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wallet_requests_total` (counter): page requests by method and outcome
//! - `wallet_request_duration_seconds` (histogram): dispatcher latency by method
//! - `wallet_rate_limited_total` (counter): requests rejected by the front door
//! - `wallet_pending_approvals` (gauge): approvals waiting for a decision
//! - `wallet_provider_health` (gauge): 1=healthy, 0=unhealthy, by provider
//! - `wallet_provider_switches_total` (counter): by chain, target and reason
//! - `wallet_derivations_total` (counter): by account kind and outcome
//! - `wallet_relay_connections` (gauge): open relay channels
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::provider::types::{ChainId, SwitchReason};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, outcome: &'static str, started: Instant) {
    metrics::counter!("wallet_requests_total", "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("wallet_request_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limited(origin: &str) {
    metrics::counter!("wallet_rate_limited_total", "origin" => origin.to_string()).increment(1);
}

pub fn record_pending_approvals(count: usize) {
    metrics::gauge!("wallet_pending_approvals").set(count as f64);
}

pub fn record_provider_health(provider: &str, healthy: bool) {
    metrics::gauge!("wallet_provider_health", "provider" => provider.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_provider_switch(chain: ChainId, to: &str, reason: SwitchReason) {
    let reason = match reason {
        SwitchReason::Requested => "requested",
        SwitchReason::Failover => "failover",
        SwitchReason::Unhealthy => "unhealthy",
        SwitchReason::Reload => "reload",
    };
    metrics::counter!(
        "wallet_provider_switches_total",
        "chain" => chain.to_string(),
        "to" => to.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_derivation(kind: &'static str, outcome: &'static str) {
    metrics::counter!("wallet_derivations_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_relay_connections(delta: i64) {
    let gauge = metrics::gauge!("wallet_relay_connections");
    if delta >= 0 {
        gauge.increment(delta as f64);
    } else {
        gauge.decrement((-delta) as f64);
    }
}
