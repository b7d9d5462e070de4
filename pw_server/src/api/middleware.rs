//! Authentication middleware for protected endpoints.
//!
//! The middleware validates the JWT access token from the `Authorization`
//! header and injects the caller's [`Actor`] into request extensions.
//!
//! # Extracting the caller
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use paywall::auth::Actor;
//!
//! async fn protected_handler(Extension(actor): Extension<Actor>) -> String {
//!     format!("Authenticated as user {}", actor.user_id)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use paywall::auth::Actor;

use super::{AppState, errors::ApiError};
use crate::logging;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Resolve the caller from the `Authorization` header, if any.
///
/// A missing or invalid token yields `None`; used by endpoints where
/// authentication is optional.
pub fn optional_actor(state: &AppState, headers: &HeaderMap) -> Option<Actor> {
    let token = bearer_token(headers)?;
    state
        .auth_manager
        .verify_access_token(token)
        .ok()
        .map(|claims| Actor::from(&claims))
}

/// Authentication middleware that validates JWT tokens and injects the caller.
///
/// # Behavior
///
/// - **Success**: Token valid → Injects `Actor` into request extensions → Calls next handler
/// - **Missing header**: Returns `401 Unauthorized`
/// - **Invalid/expired token**: Returns `401 Unauthorized`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError::unauthorized().into_response();
    };

    match state.auth_manager.verify_access_token(token) {
        Ok(claims) => {
            request.extensions_mut().insert(Actor::from(&claims));
            next.run(request).await
        }
        Err(err) => {
            logging::log_security_event(
                "invalid_token",
                None,
                None,
                &format!("{} {}: {}", request.method(), request.uri().path(), err),
            );
            ApiError::from(err).into_response()
        }
    }
}
