//! HTTP API for the paywall server.
//!
//! # Modules
//!
//! - [`auth`]: Registration, login and the current user
//! - [`resources`]: Publishing, paywalled viewing and purchase
//! - [`recharge`]: Recharge plans and the moderated order workflow
//! - [`points`]: Balance, transaction history and admin corrections
//! - [`middleware`]: Authentication middleware for protected endpoints
//! - [`rate_limiter`]: Per-IP sliding window limits
//! - [`request_id`]: Request correlation and access logging
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health                             - Storage health (public)
//! POST   /api/auth/register                  - Register and log in (public)
//! POST   /api/auth/login                     - Login (public)
//! GET    /api/auth/me                        - Current user with unlocked resources
//! GET    /api/recharge/plans                 - List plans (public, ?include_inactive)
//! POST   /api/recharge/plans                 - Create plan (admin)
//! PUT    /api/recharge/plans/{id}            - Update plan (admin)
//! DELETE /api/recharge/plans/{id}            - Delete plan (admin)
//! POST   /api/recharge/orders                - Create pending order
//! GET    /api/recharge/orders                - All orders (admin, ?status)
//! GET    /api/recharge/orders/my             - Caller's orders
//! GET    /api/recharge/orders/{id}           - Single order (owner or admin)
//! PUT    /api/recharge/orders/{id}           - Review order (admin)
//! POST   /api/resources                      - Publish resource
//! GET    /api/resources/{id}                 - View resource (optional auth)
//! POST   /api/resources/{id}/purchase        - Unlock resource with points
//! GET    /api/points/balance                 - Caller's balance
//! GET    /api/points/transactions            - Caller's ledger (?skip&limit&transaction_type)
//! GET    /api/points/admin/transactions      - All ledgers (admin)
//! POST   /api/points/admin/adjust?user_id=   - Manual correction (admin)
//! GET    /api/points/admin/audit?user_id=    - Replay a ledger (admin)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use pw_server::api::{create_router, AppState};
//! use pw_server::config::RateLimitConfig;
//! use paywall::db::MemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(
//!     Arc::new(MemoryStore::new()),
//!     "pepper".to_string(),
//!     "jwt_secret".to_string(),
//!     100,
//!     RateLimitConfig::default(),
//! );
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod errors;
pub mod middleware;
pub mod points;
pub mod rate_limiter;
pub mod recharge;
pub mod request_id;
pub mod resources;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
};
use paywall::{
    auth::AuthManager,
    db::{HealthCheck, Store},
    ledger::LedgerManager,
    recharge::RechargeManager,
    resources::ResourceManager,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::RateLimitConfig;
use rate_limiter::IpRateLimiter;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    pub ledger_manager: Arc<LedgerManager>,
    pub resource_manager: Arc<ResourceManager>,
    pub recharge_manager: Arc<RechargeManager>,
    pub health: Arc<dyn HealthCheck>,
    pub rate_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    /// Wire every manager to one storage backend
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        pepper: String,
        jwt_secret: String,
        register_reward: i64,
        rate_limit: RateLimitConfig,
    ) -> Self {
        let auth_manager = AuthManager::new(store.clone(), pepper, jwt_secret)
            .with_register_reward(register_reward);

        Self {
            auth_manager: Arc::new(auth_manager),
            ledger_manager: Arc::new(LedgerManager::new(store.clone())),
            resource_manager: Arc::new(ResourceManager::new(store.clone(), store.clone())),
            recharge_manager: Arc::new(RechargeManager::new(store.clone())),
            health: store,
            rate_limiter: Arc::new(IpRateLimiter::new(rate_limit)),
        }
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// Public and protected routes may share a path (e.g. `GET` and `POST
/// /api/recharge/plans`); the authentication layer applies per route.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/recharge/plans", get(recharge::list_plans))
        .route("/api/resources/{id}", get(resources::get_resource));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/recharge/plans", post(recharge::create_plan))
        .route(
            "/api/recharge/plans/{id}",
            put(recharge::update_plan).delete(recharge::delete_plan),
        )
        .route(
            "/api/recharge/orders",
            post(recharge::create_order).get(recharge::list_orders),
        )
        .route("/api/recharge/orders/my", get(recharge::my_orders))
        .route(
            "/api/recharge/orders/{id}",
            get(recharge::get_order).put(recharge::review_order),
        )
        .route("/api/resources", post(resources::create_resource))
        .route(
            "/api/resources/{id}/purchase",
            post(resources::purchase_resource),
        )
        .route("/api/points/balance", get(points::balance))
        .route("/api/points/transactions", get(points::transactions))
        .route(
            "/api/points/admin/transactions",
            get(points::admin_transactions),
        )
        .route("/api/points/admin/adjust", post(points::admin_adjust))
        .route("/api/points/admin/audit", get(points::admin_audit))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limiter::rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when storage answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8000/health
/// # {"status":"healthy","version":"1.0.0","storage":true,"timestamp":"2025-11-22T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_healthy = match state.health.health_check().await {
        Ok(()) => true,
        Err(err) => {
            tracing::error!("Storage health check failed: {}", err);
            false
        }
    };

    let status_code = if storage_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if storage_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "storage": storage_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
