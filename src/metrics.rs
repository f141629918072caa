/// Metrics and telemetry for the twister client
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Resource cache hit/miss rates
/// - RPC calls by method and outcome
/// - DHT queries in flight
/// - Signature verification outcomes and cost

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== Cache Metrics ==========

    /// Cache hits by resource kind
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "twister_cache_hits_total",
        "Total number of resource cache hits",
        &["kind"]
    )
    .unwrap();

    /// Cache misses by resource kind
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "twister_cache_misses_total",
        "Total number of resource cache misses",
        &["kind"]
    )
    .unwrap();

    /// Refreshes that ended in an error, by resource kind
    pub static ref REFRESH_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "twister_refresh_errors_total",
        "Total number of failed resource refreshes",
        &["kind", "code"]
    )
    .unwrap();

    // ========== RPC Metrics ==========

    /// RPC calls by method and outcome
    pub static ref RPC_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "twister_rpc_calls_total",
        "Total number of JSON-RPC calls",
        &["method", "outcome"]
    )
    .unwrap();

    /// dhtget calls currently admitted
    pub static ref DHT_QUERIES_ACTIVE: IntGauge = register_int_gauge!(
        "twister_dht_queries_active",
        "Number of dhtget calls currently in flight"
    )
    .unwrap();

    // ========== Verification Metrics ==========

    /// Signature verifications by outcome
    pub static ref SIGNATURE_VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "twister_signature_verifications_total",
        "Total number of DHT signature verifications",
        &["outcome"]
    )
    .unwrap();

    /// Time spent inside the signature check, in seconds
    pub static ref SIGNATURE_VERIFICATION_SECONDS: Histogram = register_histogram!(
        "twister_signature_verification_seconds",
        "Signature verification latencies in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a cache access
pub fn record_cache_access(kind: &str, hit: bool) {
    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[kind]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[kind]).inc();
    }
}

pub fn record_refresh_error(kind: &str, code: i64) {
    REFRESH_ERRORS_TOTAL
        .with_label_values(&[kind, &code.to_string()])
        .inc();
}

/// Record a signature verification
pub fn record_signature_verification(verified: bool, duration: f64) {
    SIGNATURE_VERIFICATIONS_TOTAL
        .with_label_values(&[if verified { "verified" } else { "rejected" }])
        .inc();
    SIGNATURE_VERIFICATION_SECONDS.observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_cache_access() {
        record_cache_access("profile", true);
        record_cache_access("profile", false);
        let metrics = render_metrics();
        assert!(metrics.contains("twister_cache_hits_total"));
        assert!(metrics.contains("twister_cache_misses_total"));
    }

    #[test]
    fn test_record_signature_verification() {
        record_signature_verification(true, 0.002);
        record_signature_verification(false, 0.001);
        let metrics = render_metrics();
        assert!(metrics.contains("twister_signature_verifications_total"));
        assert!(metrics.contains("twister_signature_verification_seconds"));
    }
}
