//! Client error taxonomy.
//!
//! Every variant is something the UI can act on: prompt a login, show the
//! balance shortfall, offer a manual retry, or point the user at an
//! administrator. None of them is retried automatically.

use thiserror::Error;

/// Client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No session, or the server answered 401
    #[error("Please log in to continue")]
    NotAuthenticated,

    /// Balance below the price, detected locally or by the server
    #[error("Insufficient points: balance {balance}, required {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    /// A 402 answer that did not say how many points were missing
    #[error("Insufficient points: {0}")]
    PaymentRequired(String),

    /// The resource is already owned; callers treat this as success
    #[error("Resource already unlocked")]
    AlreadyUnlocked,

    /// The recharge order was not created; the user may retry
    #[error("Order could not be created: {0}")]
    OrderCreationFailed(String),

    /// The plan has no QR code for any payment method
    #[error("No payment method is configured for this plan, please contact an administrator")]
    NoPaymentMethodAvailable,

    /// The server failed (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// The request timed out; whether it took effect is unknown
    #[error("Request timed out")]
    Timeout,

    /// The server could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The caller lacks the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other 4xx answer
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The same action is already waiting for the server
    #[error("A request for this action is already in flight")]
    RequestInFlight,

    /// The payment session already submitted its order
    #[error("Payment session is closed")]
    SessionClosed,

    /// The server answered with a body the client does not understand
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Reading or writing the persisted token failed
    #[error("Token storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// The user must (re-)authenticate before retrying
    pub fn needs_login(&self) -> bool {
        matches!(self, ClientError::NotAuthenticated)
    }

    /// Failures where the server's state is unknown or unchanged and a manual
    /// retry is reasonable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout
                | ClientError::Network(_)
                | ClientError::ServerError { .. }
                | ClientError::OrderCreationFailed(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_message_shows_amounts() {
        let err = ClientError::InsufficientBalance {
            balance: 50,
            required: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("50"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_retry_classification() {
        assert!(ClientError::Timeout.is_retryable());
        assert!(ClientError::OrderCreationFailed("down".to_string()).is_retryable());
        assert!(!ClientError::AlreadyUnlocked.is_retryable());
        assert!(!ClientError::NoPaymentMethodAvailable.is_retryable());
        assert!(ClientError::NotAuthenticated.needs_login());
    }
}
