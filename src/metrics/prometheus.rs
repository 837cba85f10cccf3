use ::metrics::{counter, histogram};
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus HTTP exporter on `port`.
/// After this call, anything recorded through the functions below is
/// exported at /metrics.
pub fn init_metrics_server(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("failed to start Prometheus metrics server on port {port}"))
}

// ── Pricing metrics ──────────────────────────────────────────────

/// `outcome` is "ok" or "rejected".
pub fn record_pricing(outcome: &str) {
    counter!("pricing_requests_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_degraded_source(source: &str) {
    counter!("pricing_degraded_sources_total", "source" => source.to_string()).increment(1);
}

pub fn record_clamp(category: &str) {
    counter!("pricing_clamps_total", "category" => category.to_string()).increment(1);
}

pub fn record_pricing_latency_ms(latency_ms: f64) {
    histogram!("pricing_latency_ms").record(latency_ms);
}

// ── Market intelligence metrics ──────────────────────────────────

/// `outcome` is one of "ok", "partial", "failed", "conflict".
pub fn record_refresh(outcome: &str) {
    counter!("market_refreshes_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_upstream_call(source: &str, ok: bool, latency_ms: f64) {
    let status = if ok { "ok" } else { "error" };
    counter!("upstream_calls_total", "source" => source.to_string(), "status" => status).increment(1);
    histogram!("upstream_call_latency_ms", "source" => source.to_string()).record(latency_ms);
}
