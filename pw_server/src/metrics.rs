//! Prometheus metrics for the paywall server.
//!
//! Metrics are exposed in Prometheus text format on a dedicated listener
//! when `METRICS_BIND` is configured. Without an installed recorder every
//! helper is a no-op.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use pw_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/auth/login", 200);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Paywall Metrics
// ============================================================================

/// Increment purchase counter by outcome (`charged`, `free`, `already_unlocked`, `insufficient`).
pub fn purchases_total(outcome: &str) {
    metrics::counter!("purchases_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record points spent on a purchase.
pub fn points_spent(points: i64) {
    metrics::histogram!("points_spent").record(points as f64);
}

/// Increment recharge order counter by lifecycle event (`created`, `approved`, `rejected`).
pub fn recharge_orders_total(event: &str) {
    metrics::counter!("recharge_orders_total",
        "event" => event.to_string()
    )
    .increment(1);
}

/// Record points credited by an approved recharge order.
pub fn points_recharged(points: i64) {
    metrics::histogram!("points_recharged").record(points as f64);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment login attempts counter.
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

// ============================================================================
// Rate Limiting Metrics
// ============================================================================

/// Increment rate limit hits counter.
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
