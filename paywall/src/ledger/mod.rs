//! Points ledger: the authoritative balance of every user.
//!
//! This module implements:
//! - Append-only point transactions with `balance_after` snapshots
//! - Non-negative balance enforcement on every debit
//! - Admin manual corrections (ADMIN_ADJUST / REFUND)
//! - Ledger audit (balance equals the sum of all entries)
//!
//! Credits from recharge orders and debits from purchases are written by the
//! recharge and resources modules inside their own atomic units, using
//! [`next_balance`] so the arithmetic is identical everywhere.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{LedgerError, LedgerResult};
pub use manager::LedgerManager;
pub use models::{
    AdjustRequest, LedgerAudit, NewTransaction, PointTransaction, PointsBalance, TransactionQuery,
    TransactionType, next_balance, replay,
};
