//! # Paywall
//!
//! Points-based paywall: users spend points to unlock paid resources and top
//! up their balance through recharge orders that an administrator approves.
//!
//! ## Core Modules
//!
//! - [`auth`]: Registration, login and JWT access tokens
//! - [`ledger`]: Append-only points ledger with `balance_after` snapshots
//! - [`resources`]: Paid resources, atomic purchases and the paywall gate
//! - [`recharge`]: Recharge plans and the moderated order workflow
//! - [`db`]: Repository traits with PostgreSQL and in-memory stores
//!
//! ## Invariants
//!
//! - A user's balance equals the sum of their ledger entries and is never negative.
//! - A purchase debits and unlocks in one atomic unit; a resource is charged at most once.
//! - Orders move `PENDING -> APPROVED | REJECTED` only, and an approval credits exactly once.
//!
//! ## Example
//!
//! ```
//! use paywall::resources::{Resource, is_unlocked};
//! use std::collections::BTreeSet;
//!
//! # let resource: Resource = serde_json::from_str(r#"{"id": 3, "title": "t",
//! #     "description": "", "author_id": 1, "is_free": false, "points_required": 10,
//! #     "created_at": "2025-01-01T00:00:00Z"}"#).unwrap();
//! let owned: BTreeSet<i64> = [3].into_iter().collect();
//! assert!(is_unlocked(&resource, Some(&owned)));
//! assert!(!is_unlocked::<BTreeSet<i64>>(&resource, None));
//! ```

pub mod auth;
pub mod db;
pub mod ledger;
pub mod recharge;
pub mod resources;

pub use auth::{Actor, AuthManager, User, UserId, UserRole};
pub use ledger::{LedgerManager, PointTransaction, TransactionType};
pub use recharge::{OrderStatus, PaymentMethod, RechargeManager, RechargeOrder, RechargePlan};
pub use resources::{Entitlements, Resource, ResourceId, ResourceManager, is_unlocked};
