//! Recharge error types.

use thiserror::Error;

use super::models::{OrderId, OrderStatus, PlanId};
use crate::auth::UserId;
use crate::ledger::LedgerError;

/// Recharge errors
#[derive(Debug, Error)]
pub enum RechargeError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Plan not found
    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),

    /// Order not found
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Invalid plan definition
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Invalid order request
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Status change not allowed from the current state
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Caller lacks the administrator role
    #[error("Administrator access required")]
    Forbidden,

    /// Crediting the order failed
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl RechargeError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            RechargeError::Database(_) | RechargeError::Ledger(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<LedgerError> for RechargeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Database(e) => RechargeError::Database(e),
            LedgerError::UserNotFound(id) => RechargeError::UserNotFound(id),
            other => RechargeError::Ledger(other.to_string()),
        }
    }
}

/// Result type for recharge operations
pub type RechargeResult<T> = Result<T, RechargeError>;
