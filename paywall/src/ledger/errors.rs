//! Ledger error types.

use thiserror::Error;

use super::models::TransactionType;
use crate::auth::UserId;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Debit would take the balance below zero
    #[error("Insufficient points: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Invalid amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Transaction type not allowed for this operation
    #[error("Transaction type {0} cannot be created manually")]
    InvalidTransactionType(TransactionType),

    /// Balance would overflow
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Caller lacks the administrator role
    #[error("Administrator access required")]
    Forbidden,
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) => "Internal server error".to_string(),
            LedgerError::UserNotFound(_) => "User not found".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
