//! Ledger manager implementation.

use super::{
    errors::{LedgerError, LedgerResult},
    models::{
        AdjustRequest, DEFAULT_ADMIN_PAGE_SIZE, DEFAULT_PAGE_SIZE, LedgerAudit, NewTransaction,
        PointTransaction, PointsBalance, TransactionQuery, TransactionType, replay,
    },
};
use crate::auth::{Actor, UserId};
use crate::db::LedgerRepository;
use std::sync::Arc;

/// Ledger manager
#[derive(Clone)]
pub struct LedgerManager {
    ledger: Arc<dyn LedgerRepository>,
}

impl LedgerManager {
    /// Create a new ledger manager
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    /// Current balance and lifetime recharge total for a user
    pub async fn balance(&self, user_id: UserId) -> LedgerResult<PointsBalance> {
        self.ledger.balance(user_id).await
    }

    /// A user's own history, newest first.
    ///
    /// Any `user_id` in the query is overridden with the caller.
    pub async fn transactions(
        &self,
        user_id: UserId,
        mut query: TransactionQuery,
    ) -> LedgerResult<Vec<PointTransaction>> {
        query.user_id = Some(user_id);
        query.limit = Some(query.page_size(DEFAULT_PAGE_SIZE));
        self.ledger.transactions(&query).await
    }

    /// Listing across all users (admin only)
    pub async fn admin_transactions(
        &self,
        actor: &Actor,
        mut query: TransactionQuery,
    ) -> LedgerResult<Vec<PointTransaction>> {
        if !actor.is_admin() {
            return Err(LedgerError::Forbidden);
        }
        query.limit = Some(query.page_size(DEFAULT_ADMIN_PAGE_SIZE));
        self.ledger.transactions(&query).await
    }

    /// Manual balance correction (admin only)
    ///
    /// # Errors
    ///
    /// * `LedgerError::Forbidden` - Caller is not an administrator
    /// * `LedgerError::InvalidAmount` - Amount is zero
    /// * `LedgerError::InvalidTransactionType` - Only ADMIN_ADJUST and REFUND are allowed
    /// * `LedgerError::InsufficientBalance` - Debit exceeds the balance
    /// * `LedgerError::UserNotFound` - Target user does not exist
    pub async fn adjust(
        &self,
        actor: &Actor,
        user_id: UserId,
        request: AdjustRequest,
    ) -> LedgerResult<PointTransaction> {
        if !actor.is_admin() {
            return Err(LedgerError::Forbidden);
        }

        if request.amount == 0 {
            return Err(LedgerError::InvalidAmount(request.amount));
        }

        if !matches!(
            request.transaction_type,
            TransactionType::AdminAdjust | TransactionType::Refund
        ) {
            return Err(LedgerError::InvalidTransactionType(request.transaction_type));
        }

        let description = if request.description.trim().is_empty() {
            format!("Manual adjustment by admin {}", actor.user_id)
        } else {
            request.description
        };

        let entry = self
            .ledger
            .apply(NewTransaction {
                user_id,
                transaction_type: request.transaction_type,
                amount: request.amount,
                description,
                reference_id: request.reference_id,
            })
            .await?;

        log::info!(
            "Admin {} adjusted user {} by {} ({}), balance now {}",
            actor.user_id,
            user_id,
            entry.amount,
            entry.transaction_type,
            entry.balance_after
        );

        Ok(entry)
    }

    /// Replay a user's ledger and compare it with the stored balance
    pub async fn audit(&self, user_id: UserId) -> LedgerResult<LedgerAudit> {
        let balance = self.ledger.balance(user_id).await?;
        let history = self.ledger.history(user_id).await?;
        let (ledger_sum, first_mismatch) = replay(&history);

        let audit = LedgerAudit {
            user_id,
            stored_balance: balance.balance,
            ledger_sum,
            entries: history.len(),
            first_mismatch,
        };

        if !audit.is_consistent() {
            log::error!(
                "Ledger mismatch for user {}: stored {} vs ledger {}",
                user_id,
                audit.stored_balance,
                audit.ledger_sum
            );
        }

        Ok(audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthManager, RegisterRequest, UserRole};
    use crate::db::MemoryStore;

    async fn setup() -> (LedgerManager, UserId) {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthManager::new(store.clone(), "pepper".to_string(), "secret".to_string());
        let user = auth
            .register(RegisterRequest {
                username: "reader".to_string(),
                password: "SecurePass123".to_string(),
                display_name: String::new(),
                email: None,
            })
            .await
            .unwrap();

        (LedgerManager::new(store), user.id)
    }

    fn admin() -> Actor {
        Actor::new(999, UserRole::Admin)
    }

    fn adjust(amount: i64) -> AdjustRequest {
        AdjustRequest {
            transaction_type: TransactionType::AdminAdjust,
            amount,
            description: "correction".to_string(),
            reference_id: None,
        }
    }

    #[tokio::test]
    async fn test_register_reward_is_first_entry() {
        let (ledger, user_id) = setup().await;

        let history = ledger.transactions(user_id, TransactionQuery::default()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transaction_type, TransactionType::Register);
        assert_eq!(history[0].balance_after, 100);
        assert_eq!(ledger.balance(user_id).await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_adjust_requires_admin() {
        let (ledger, user_id) = setup().await;
        let err = ledger
            .adjust(&Actor::new(user_id, UserRole::User), user_id, adjust(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden));
    }

    #[tokio::test]
    async fn test_adjust_rejects_zero_and_overdraft() {
        let (ledger, user_id) = setup().await;

        assert!(matches!(
            ledger.adjust(&admin(), user_id, adjust(0)).await,
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            ledger.adjust(&admin(), user_id, adjust(-101)).await,
            Err(LedgerError::InsufficientBalance { available: 100, required: 101 })
        ));
        assert_eq!(ledger.balance(user_id).await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_adjust_rejects_system_types() {
        let (ledger, user_id) = setup().await;
        let mut request = adjust(10);
        request.transaction_type = TransactionType::Recharge;

        assert!(matches!(
            ledger.adjust(&admin(), user_id, request).await,
            Err(LedgerError::InvalidTransactionType(TransactionType::Recharge))
        ));
    }

    #[tokio::test]
    async fn test_refund_and_audit() {
        let (ledger, user_id) = setup().await;
        let mut refund = adjust(40);
        refund.transaction_type = TransactionType::Refund;

        let entry = ledger.adjust(&admin(), user_id, refund).await.unwrap();
        assert_eq!(entry.balance_after, 140);
        ledger.adjust(&admin(), user_id, adjust(-140)).await.unwrap();

        let audit = ledger.audit(user_id).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.stored_balance, 0);
        assert_eq!(audit.entries, 3);
    }

    #[tokio::test]
    async fn test_admin_listing_filters_by_type() {
        let (ledger, user_id) = setup().await;
        ledger.adjust(&admin(), user_id, adjust(5)).await.unwrap();

        let query = TransactionQuery {
            transaction_type: Some(TransactionType::AdminAdjust),
            ..TransactionQuery::default()
        };
        let entries = ledger.admin_transactions(&admin(), query).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, 5);

        assert!(matches!(
            ledger
                .admin_transactions(&Actor::new(user_id, UserRole::Vip), TransactionQuery::default())
                .await,
            Err(LedgerError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_unknown_user_balance() {
        let (ledger, _) = setup().await;
        assert!(matches!(
            ledger.balance(4242).await,
            Err(LedgerError::UserNotFound(4242))
        ));
    }
}
