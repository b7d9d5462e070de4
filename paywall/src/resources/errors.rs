//! Resource error types.

use thiserror::Error;

use super::models::ResourceId;
use crate::auth::UserId;
use crate::ledger::LedgerError;

/// Resource errors
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(ResourceId),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The user already owns this resource
    #[error("Resource {0} already unlocked")]
    AlreadyUnlocked(ResourceId),

    /// Not enough points for the purchase
    #[error("Insufficient points: balance {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// Invalid resource definition
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Balance arithmetic failed
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl ResourceError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            ResourceError::Database(_) | ResourceError::Ledger(_) => {
                "Internal server error".to_string()
            }
            ResourceError::AlreadyUnlocked(_) => "Resource already purchased".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<LedgerError> for ResourceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Database(e) => ResourceError::Database(e),
            LedgerError::InsufficientBalance {
                available,
                required,
            } => ResourceError::InsufficientBalance {
                available,
                required,
            },
            LedgerError::UserNotFound(id) => ResourceError::UserNotFound(id),
            other => ResourceError::Ledger(other.to_string()),
        }
    }
}

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, ResourceError>;
