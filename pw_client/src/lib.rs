//! Client side of the points paywall.
//!
//! This library provides the API client, the session context, the purchase
//! and payment flows and command parsing used by the pw_client binary.

pub mod api_client;
pub mod app;
pub mod commands;
pub mod errors;
pub mod payment_session;
pub mod purchase;
pub mod session;
pub mod state;
pub mod token_store;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use api_client::{ApiClient, PaywallApi};
pub use errors::{ClientError, ClientResult};
pub use session::{SessionContext, SessionUser};
