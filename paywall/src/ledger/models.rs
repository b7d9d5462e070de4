//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::errors::{LedgerError, LedgerResult};
use crate::auth::UserId;

/// Default page size for a user's own history
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Default page size for the admin-wide listing
pub const DEFAULT_ADMIN_PAGE_SIZE: i64 = 100;

/// Upper bound for any single page
pub const MAX_PAGE_SIZE: i64 = 500;

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Register,
    Recharge,
    Purchase,
    Refund,
    AdminAdjust,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Register => write!(f, "REGISTER"),
            TransactionType::Recharge => write!(f, "RECHARGE"),
            TransactionType::Purchase => write!(f, "PURCHASE"),
            TransactionType::Refund => write!(f, "REFUND"),
            TransactionType::AdminAdjust => write!(f, "ADMIN_ADJUST"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REGISTER" => Ok(TransactionType::Register),
            "RECHARGE" => Ok(TransactionType::Recharge),
            "PURCHASE" => Ok(TransactionType::Purchase),
            "REFUND" => Ok(TransactionType::Refund),
            "ADMIN_ADJUST" => Ok(TransactionType::AdminAdjust),
            other => Err(format!("unknown transaction type '{other}'")),
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: i64,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Balance summary returned by `GET /api/points/balance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBalance {
    pub user_id: UserId,
    pub balance: i64,
    pub total_recharged: i64,
}

/// Entry to append to the ledger
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub description: String,
    pub reference_id: Option<String>,
}

/// Manual correction body for `POST /api/points/admin/adjust`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    #[serde(rename = "type", default = "default_adjust_type")]
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub description: String,
    #[serde(default)]
    pub reference_id: Option<String>,
}

fn default_adjust_type() -> TransactionType {
    TransactionType::AdminAdjust
}

/// Filter and pagination for transaction listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub user_id: Option<UserId>,
    pub transaction_type: Option<TransactionType>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

impl TransactionQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Offset, clamped to be non-negative
    pub fn offset(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    /// Page size, clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn matches(&self, entry: &PointTransaction) -> bool {
        self.user_id.is_none_or(|id| id == entry.user_id)
            && self
                .transaction_type
                .is_none_or(|kind| kind == entry.transaction_type)
    }
}

/// Result of replaying a user's ledger against the stored balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub user_id: UserId,
    pub stored_balance: i64,
    pub ledger_sum: i64,
    pub entries: usize,
    /// ID of the first entry whose `balance_after` disagrees with the running sum
    pub first_mismatch: Option<i64>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.stored_balance == self.ledger_sum && self.first_mismatch.is_none()
    }
}

/// Apply a signed amount to a balance.
///
/// # Errors
///
/// * `LedgerError::InsufficientBalance` - Result would be negative
/// * `LedgerError::BalanceOverflow` - Result does not fit in `i64`
pub fn next_balance(current: i64, amount: i64) -> LedgerResult<i64> {
    let next = current
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow)?;

    if next < 0 {
        return Err(LedgerError::InsufficientBalance {
            available: current,
            required: amount.saturating_neg(),
        });
    }

    Ok(next)
}

/// Replay entries (oldest first), returning the running sum and the first
/// entry whose `balance_after` does not match it.
pub fn replay(entries: &[PointTransaction]) -> (i64, Option<i64>) {
    let mut sum: i64 = 0;
    let mut first_mismatch = None;

    for entry in entries {
        sum = sum.saturating_add(entry.amount);
        if first_mismatch.is_none() && (entry.balance_after != sum || sum < 0) {
            first_mismatch = Some(entry.id);
        }
    }

    (sum, first_mismatch)
}
