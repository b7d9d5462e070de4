//! Authentication error types.

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Username or password did not match
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Account has been disabled by an administrator
    #[error("Account disabled")]
    AccountDisabled,

    /// Username already exists
    #[error("Username already exists")]
    UsernameTaken,

    /// Email already exists
    #[error("Email already exists")]
    EmailTaken,

    /// Invalid username format
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Password too weak
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// JWT token error
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    /// Caller lacks the administrator role
    #[error("Administrator access required")]
    Forbidden,
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database and JWT errors are sanitized to prevent information disclosure
    /// about the internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) => "Internal server error".to_string(),
            AuthError::JwtError(_) => "Authentication failed".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
