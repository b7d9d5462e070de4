//! Authentication API handlers.
//!
//! # Examples
//!
//! Register a new user:
//! ```bash
//! curl -X POST http://localhost:8000/api/auth/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"username": "reader1", "password": "Pass1234", "display_name": "Reader One"}'
//! ```
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:8000/api/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"username": "reader1", "password": "Pass1234"}'
//! ```

use axum::{Extension, Json, extract::State, http::StatusCode};
use paywall::auth::{Actor, AuthResponse, CurrentUser, LoginRequest, RegisterRequest};

use super::{AppState, errors::ApiResult};
use crate::{logging, metrics};

/// Register a new user account and automatically log them in.
///
/// The new account is credited with the registration reward.
///
/// # Errors
///
/// - `400 Bad Request`: Invalid username or weak password
/// - `409 Conflict`: Username or email already taken
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let login = LoginRequest {
        username: payload.username.clone(),
        password: payload.password.clone(),
    };

    state.auth_manager.register(payload).await?;
    let (user, tokens) = state.auth_manager.login(login).await?;

    Ok((StatusCode::CREATED, Json(AuthResponse::new(tokens, user))))
}

/// Authenticate a user and issue an access token.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `403 Forbidden`: Account disabled
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let username = payload.username.clone();

    match state.auth_manager.login(payload).await {
        Ok((user, tokens)) => {
            metrics::login_attempts_total(true);
            Ok(Json(AuthResponse::new(tokens, user)))
        }
        Err(err) => {
            metrics::login_attempts_total(false);
            logging::log_security_event(
                "failed_login",
                None,
                None,
                &format!("Login for '{}' failed: {}", username, err),
            );
            Err(err.into())
        }
    }
}

/// The caller's profile, current balance and unlocked resources.
///
/// Clients use this to reconcile their session after every balance-changing
/// response.
pub async fn me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<CurrentUser>> {
    let user = state.auth_manager.get_user(actor.user_id).await?;
    let unlocked_resource_ids = state
        .resource_manager
        .unlocked_resource_ids(actor.user_id)
        .await?;

    Ok(Json(CurrentUser {
        user,
        unlocked_resource_ids,
    }))
}
