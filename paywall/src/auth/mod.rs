//! Authentication module providing user registration, login, and access tokens.
//!
//! This module implements:
//! - Argon2id password hashing with server-side pepper
//! - JWT access tokens carrying the user's role
//! - Registration reward credited through the points ledger
//!
//! ## Example
//!
//! ```no_run
//! use paywall::auth::{AuthManager, RegisterRequest};
//! use paywall::db::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let auth = AuthManager::new(
//!         store,
//!         "secret_pepper".to_string(),
//!         "jwt_secret".to_string(),
//!     );
//!
//!     let request = RegisterRequest {
//!         username: "reader1".to_string(),
//!         password: "SecurePass123".to_string(),
//!         display_name: "Reader One".to_string(),
//!         email: Some("reader@example.com".to_string()),
//!     };
//!
//!     let user = auth.register(request).await?;
//!     println!("Registered {} with {} points", user.username, user.points);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{AuthError, AuthResult};
pub use manager::{AuthManager, DEFAULT_REGISTER_REWARD};
pub use models::{
    AccessTokenClaims, Actor, AuthResponse, CurrentUser, LoginRequest, NewUser, RegisterRequest,
    SessionTokens, User, UserId, UserRole,
};
