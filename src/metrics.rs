#[cfg(feature = "server")]
use axum::{http::StatusCode, response::IntoResponse};
#[cfg(feature = "server")]
use metrics::{counter, histogram};
#[cfg(feature = "server")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "server")]
use std::sync::OnceLock;

#[cfg(feature = "server")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[cfg(feature = "server")]
pub fn init_metrics() {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("metrics recorder already installed");
                return;
            }

            // Register series with zero values so they render immediately
            counter!("domain_lookup_requests_total", "tld" => "unknown").absolute(0);
            counter!("domain_lookup_cache_hits_total").absolute(0);
            counter!("domain_lookup_cache_misses_total").absolute(0);
            counter!("domain_lookup_errors_total", "error_type" => "unknown").absolute(0);
            histogram!("domain_lookup_request_duration_seconds").record(0.0);
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to install metrics recorder");
        }
    }
}

#[cfg(feature = "server")]
pub fn increment_requests(domain: &str) {
    let tld = extract_tld(domain);
    counter!("domain_lookup_requests_total", "tld" => tld).increment(1);
}

#[cfg(feature = "server")]
pub fn increment_cache_hits() {
    counter!("domain_lookup_cache_hits_total").increment(1);
}

#[cfg(feature = "server")]
pub fn increment_cache_misses() {
    counter!("domain_lookup_cache_misses_total").increment(1);
}

#[cfg(feature = "server")]
pub fn increment_errors(error_type: &str) {
    counter!("domain_lookup_errors_total", "error_type" => error_type.to_string()).increment(1);
}

#[cfg(feature = "server")]
pub fn record_request_time(duration_ms: u64) {
    let duration_seconds = duration_ms as f64 / 1000.0;
    histogram!("domain_lookup_request_duration_seconds").record(duration_seconds);
}

#[cfg(feature = "server")]
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

#[cfg(feature = "server")]
fn extract_tld(domain: &str) -> String {
    domain.rsplit('.').next().unwrap_or("unknown").to_lowercase()
}
