//! Paywall HTTP server.
//!
//! Exposes the `paywall` managers over an axum JSON API with JWT
//! authentication, per-IP rate limiting, request correlation and
//! Prometheus metrics.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
