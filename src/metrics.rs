use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("phasenav_diagram_requests_total", "Total number of diagram requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("phasenav_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref VALIDATION_FAILURES: Counter =
        register_counter!("phasenav_validation_failures_total", "Requests rejected by validation").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("phasenav_upstream_failures_total", "Failed materials database or engine calls").unwrap();
    pub static ref DIAGRAM_LATENCY: Histogram = register_histogram!(
        "phasenav_diagram_latency_seconds",
        "Time spent generating a phase diagram"
    )
    .unwrap();
    pub static ref RATE_LIMIT_KEYS: Gauge =
        register_gauge!("phasenav_rate_limit_keys", "Keys currently tracked by the rate limiter").unwrap();
}

// Prometheus text format of everything registered
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Metrics are not valid UTF-8: {}", e))
}
