//! Mapping of domain errors to HTTP responses.
//!
//! Every failure leaves the API as `{"error": "<message>"}` with a status
//! derived from the error variant. Insufficient-balance errors also carry the
//! caller's `balance` and the `required` price so clients can explain the
//! refusal without another round trip.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use paywall::{
    auth::AuthError, ledger::LedgerError, recharge::RechargeError, resources::ResourceError,
};
use serde::{Deserialize, Serialize};

/// JSON error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<i64>,
}

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                balance: None,
                required: None,
            },
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required")
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
    }

    fn insufficient(message: String, available: i64, required: i64) -> Self {
        Self {
            status: StatusCode::PAYMENT_REQUIRED,
            body: ErrorResponse {
                error: message,
                balance: Some(available),
                required: Some(required),
            },
        }
    }

    fn internal(err: &dyn std::fmt::Display, message: String) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.client_message();
        match err {
            AuthError::InvalidCredentials | AuthError::JwtError(_) => {
                Self::new(StatusCode::UNAUTHORIZED, message)
            }
            AuthError::AccountDisabled | AuthError::Forbidden => {
                Self::new(StatusCode::FORBIDDEN, message)
            }
            AuthError::UserNotFound => Self::new(StatusCode::NOT_FOUND, message),
            AuthError::UsernameTaken | AuthError::EmailTaken => {
                Self::new(StatusCode::CONFLICT, message)
            }
            AuthError::InvalidUsername(_) | AuthError::WeakPassword(_) => {
                Self::new(StatusCode::BAD_REQUEST, message)
            }
            AuthError::Database(_) | AuthError::HashingFailed => Self::internal(&err, message),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let message = err.client_message();
        match err {
            LedgerError::InsufficientBalance {
                available,
                required,
            } => Self::insufficient(message, available, required),
            LedgerError::UserNotFound(_) => Self::new(StatusCode::NOT_FOUND, message),
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidTransactionType(_)
            | LedgerError::BalanceOverflow => Self::new(StatusCode::BAD_REQUEST, message),
            LedgerError::Forbidden => Self::new(StatusCode::FORBIDDEN, message),
            LedgerError::Database(_) => Self::internal(&err, message),
        }
    }
}

impl From<ResourceError> for ApiError {
    fn from(err: ResourceError) -> Self {
        let message = err.client_message();
        match err {
            ResourceError::NotFound(_) | ResourceError::UserNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, message)
            }
            ResourceError::AlreadyUnlocked(_) => Self::new(StatusCode::CONFLICT, message),
            ResourceError::InsufficientBalance {
                available,
                required,
            } => Self::insufficient(message, available, required),
            ResourceError::InvalidResource(_) => Self::new(StatusCode::BAD_REQUEST, message),
            ResourceError::Database(_) | ResourceError::Ledger(_) => Self::internal(&err, message),
        }
    }
}

impl From<RechargeError> for ApiError {
    fn from(err: RechargeError) -> Self {
        let message = err.client_message();
        match err {
            RechargeError::PlanNotFound(_)
            | RechargeError::OrderNotFound(_)
            | RechargeError::UserNotFound(_) => Self::new(StatusCode::NOT_FOUND, message),
            RechargeError::InvalidPlan(_) | RechargeError::InvalidOrder(_) => {
                Self::new(StatusCode::BAD_REQUEST, message)
            }
            RechargeError::InvalidTransition { .. } => Self::new(StatusCode::CONFLICT, message),
            RechargeError::Forbidden => Self::new(StatusCode::FORBIDDEN, message),
            RechargeError::Database(_) | RechargeError::Ledger(_) => Self::internal(&err, message),
        }
    }
}

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use paywall::recharge::OrderStatus;

    #[test]
    fn test_insufficient_balance_carries_amounts() {
        let err = ApiError::from(ResourceError::InsufficientBalance {
            available: 50,
            required: 100,
        });
        assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.body.balance, Some(50));
        assert_eq!(err.body.required, Some(100));
    }

    #[test]
    fn test_database_errors_are_sanitized() {
        let err = ApiError::from(RechargeError::Database(sqlx::Error::RowNotFound));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.error, "Internal server error");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::UsernameTaken).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(LedgerError::Forbidden).status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(ResourceError::AlreadyUnlocked(1)).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RechargeError::InvalidTransition {
                from: OrderStatus::Approved,
                to: OrderStatus::Rejected,
            })
            .status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(RechargeError::OrderNotFound(9)).status,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_error_body_omits_empty_amounts() {
        let json = serde_json::to_value(ApiError::unauthorized().body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Authentication required"}));
    }
}
