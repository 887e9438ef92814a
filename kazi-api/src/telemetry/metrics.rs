//! Prometheus counters and histograms for HTTP traffic, gateway calls and
//! rate limiting, plus the `/metrics` scrape handler.

use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

// Gateway calls are mostly single-statement, so the low end is finer.
const GATEWAY_LATENCY_BUCKETS: &[f64] =
    &[0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Process-wide registry handle, registered on first use.
pub static METRICS: Lazy<ApiResult<KaziMetrics>> = Lazy::new(KaziMetrics::new);

#[derive(Clone)]
pub struct KaziMetrics {
    /// method, path, status
    pub http_requests_total: CounterVec,
    /// method, path
    pub http_request_duration_seconds: HistogramVec,
    /// operation, table, status (`ok` or an error code)
    pub gateway_operations_total: CounterVec,
    /// operation, table
    pub gateway_operation_duration_seconds: HistogramVec,
    /// kind: `principal` or `ip`
    pub rate_limited_total: CounterVec,
}

fn registered<T>(name: &str, result: prometheus::Result<T>) -> ApiResult<T> {
    result.map_err(|e| ApiError::internal_error(format!("cannot register {}: {}", name, e)))
}

impl KaziMetrics {
    pub fn new() -> ApiResult<Self> {
        let http_requests_total = registered(
            "kazi_http_requests_total",
            register_counter_vec!(
                "kazi_http_requests_total",
                "HTTP requests served",
                &["method", "path", "status"]
            ),
        )?;
        let http_request_duration_seconds = registered(
            "kazi_http_request_duration_seconds",
            register_histogram_vec!(
                "kazi_http_request_duration_seconds",
                "HTTP request latency",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            ),
        )?;
        let gateway_operations_total = registered(
            "kazi_gateway_operations_total",
            register_counter_vec!(
                "kazi_gateway_operations_total",
                "Resource gateway calls by outcome",
                &["operation", "table", "status"]
            ),
        )?;
        let gateway_operation_duration_seconds = registered(
            "kazi_gateway_operation_duration_seconds",
            register_histogram_vec!(
                "kazi_gateway_operation_duration_seconds",
                "Resource gateway call latency",
                &["operation", "table"],
                GATEWAY_LATENCY_BUCKETS.to_vec()
            ),
        )?;
        let rate_limited_total = registered(
            "kazi_rate_limited_total",
            register_counter_vec!(
                "kazi_rate_limited_total",
                "Requests rejected by the rate limiter",
                &["kind"]
            ),
        )?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            gateway_operations_total,
            gateway_operation_duration_seconds,
            rate_limited_total,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a gateway operation.
    pub fn record_gateway_operation(
        &self,
        operation: &str,
        table: &str,
        status: &str,
        duration_secs: f64,
    ) {
        self.gateway_operations_total
            .with_label_values(&[operation, table, status])
            .inc();
        self.gateway_operation_duration_seconds
            .with_label_values(&[operation, table])
            .observe(duration_secs);
    }

    pub fn record_rate_limited(&self, kind: &str) {
        self.rate_limited_total.with_label_values(&[kind]).inc();
    }
}

/// Record a gateway operation on the global registry, if it initialized.
pub fn record_gateway_operation(operation: &str, table: &str, status: &str, elapsed: Duration) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_gateway_operation(operation, table, status, elapsed.as_secs_f64());
    }
}

/// `GET /metrics` in the Prometheus text format.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler() -> impl IntoResponse {
    // Register before the first scrape so empty families still show up.
    Lazy::force(&METRICS);

    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("metrics encoding failed: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_gateway_operation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        record_gateway_operation("create", "invoices", "ok", Duration::from_millis(3));
        let count = metrics
            .gateway_operations_total
            .with_label_values(&["create", "invoices", "ok"])
            .get();
        assert!(count >= 1.0);
        Ok(())
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_http_request("GET", "/api/v1/invoices/{id}", 200, 0.015);
        metrics.record_rate_limited("ip");
        Ok(())
    }
}
