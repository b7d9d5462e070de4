//! Structured logging setup.
//!
//! The server logs through `tracing`; the `paywall` library logs through the
//! `log` facade, which `tracing-subscriber` picks up via its `tracing-log`
//! bridge.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging.
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use pw_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// # Example
///
/// ```
/// use pw_server::logging::log_security_event;
///
/// log_security_event(
///     "rate_limited",
///     None,
///     Some("192.168.1.1"),
///     "Per-second limit exceeded"
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    user_id: Option<i64>,
    ip_address: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        ip_address = ip_address,
        "SECURITY: {}",
        message
    );
}

/// Log a ledger mutation made through the API
///
/// # Arguments
///
/// * `event_type` - `purchase`, `recharge` or `adjust`
/// * `user_id` - Owner of the ledger
/// * `amount` - Signed points delta
/// * `balance_after` - Balance once the entry is applied
pub fn log_ledger_event(event_type: &str, user_id: i64, amount: i64, balance_after: i64) {
    tracing::info!(
        event_type = event_type,
        user_id = user_id,
        amount = amount,
        balance_after = balance_after,
        "LEDGER: points moved"
    );
}

/// Log API request/response
///
/// Requests slower than a second are logged at warn level.
pub fn log_api_request(method: &str, path: &str, status_code: u16, duration_ms: u64) {
    if duration_ms > 1000 {
        tracing::warn!(
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            "Slow API request"
        );
    } else {
        tracing::info!(
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            "API request completed"
        );
    }
}
