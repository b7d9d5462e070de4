//! In-memory store.
//!
//! All state sits behind one async mutex, so every trait method observes and
//! writes a consistent snapshot; validation happens before the first write,
//! which keeps each operation all-or-nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use super::repository::{
    HealthCheck, LedgerRepository, RechargeRepository, ResourceRepository, UserRepository,
};
use crate::auth::{AuthError, AuthResult, NewUser, User, UserId, UserRole};
use crate::ledger::{
    LedgerError, LedgerResult, NewTransaction, PointTransaction, PointsBalance, TransactionQuery,
    TransactionType, next_balance,
};
use crate::recharge::{
    NewRechargeOrder, NewRechargePlan, OrderId, OrderReview, OrderStatus, PlanId, RechargeError,
    RechargeOrder, RechargePlan, RechargeResult, ReviewOutcome, recharge_description,
};
use crate::resources::{
    NewResource, PurchaseReceipt, Resource, ResourceError, ResourceId, ResourceResult,
    UnlockRecord, purchase_reference,
};

#[derive(Default)]
struct State {
    next_user_id: UserId,
    next_transaction_id: i64,
    next_resource_id: ResourceId,
    next_plan_id: PlanId,
    next_order_id: OrderId,
    users: BTreeMap<UserId, (User, String)>,
    transactions: Vec<PointTransaction>,
    resources: BTreeMap<ResourceId, Resource>,
    unlocks: BTreeMap<(UserId, ResourceId), UnlockRecord>,
    plans: BTreeMap<PlanId, RechargePlan>,
    orders: BTreeMap<OrderId, RechargeOrder>,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl State {
    fn user(&self, user_id: UserId) -> LedgerResult<&User> {
        self.users
            .get(&user_id)
            .map(|(user, _)| user)
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    /// Append an entry after checking it against the balance
    fn append(&mut self, entry: NewTransaction, now: DateTime<Utc>) -> LedgerResult<PointTransaction> {
        let current = self.user(entry.user_id)?.points;
        let balance_after = next_balance(current, entry.amount)?;

        let tx = PointTransaction {
            id: next_id(&mut self.next_transaction_id),
            user_id: entry.user_id,
            transaction_type: entry.transaction_type,
            amount: entry.amount,
            balance_after,
            description: entry.description,
            reference_id: entry.reference_id,
            created_at: now,
        };

        if let Some((user, _)) = self.users.get_mut(&entry.user_id) {
            user.points = balance_after;
        }
        self.transactions.push(tx.clone());

        Ok(tx)
    }
}

/// Store keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, new_user: NewUser, register_reward: i64) -> AuthResult<User> {
        let mut state = self.state.lock().await;

        for (user, _) in state.users.values() {
            if user.username == new_user.username {
                return Err(AuthError::UsernameTaken);
            }
            if new_user.email.is_some() && user.email == new_user.email {
                return Err(AuthError::EmailTaken);
            }
        }

        let now = Utc::now();
        let reward = register_reward.max(0);
        let user = User {
            id: next_id(&mut state.next_user_id),
            username: new_user.username,
            display_name: new_user.display_name,
            email: new_user.email,
            role: new_user.role,
            points: reward,
            total_recharged: 0,
            is_active: true,
            created_at: now,
            last_login: None,
        };

        if reward > 0 {
            let tx = PointTransaction {
                id: next_id(&mut state.next_transaction_id),
                user_id: user.id,
                transaction_type: TransactionType::Register,
                amount: reward,
                balance_after: reward,
                description: "Registration reward".to_string(),
                reference_id: None,
                created_at: now,
            };
            state.transactions.push(tx);
        }

        state
            .users
            .insert(user.id, (user.clone(), new_user.password_hash));
        Ok(user)
    }

    async fn find_credentials(&self, username: &str) -> AuthResult<Option<(User, String)>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|(user, _)| user.username == username)
            .cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).map(|(user, _)| user.clone()))
    }

    async fn update_last_login(&self, user_id: UserId) -> AuthResult<()> {
        let mut state = self.state.lock().await;
        let (user, _) = state.users.get_mut(&user_id).ok_or(AuthError::UserNotFound)?;
        user.last_login = Some(Utc::now());
        Ok(())
    }

    async fn set_role(&self, user_id: UserId, role: UserRole) -> AuthResult<User> {
        let mut state = self.state.lock().await;
        let (user, _) = state.users.get_mut(&user_id).ok_or(AuthError::UserNotFound)?;
        user.role = role;
        Ok(user.clone())
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn balance(&self, user_id: UserId) -> LedgerResult<PointsBalance> {
        let state = self.state.lock().await;
        let user = state.user(user_id)?;
        Ok(PointsBalance {
            user_id,
            balance: user.points,
            total_recharged: user.total_recharged,
        })
    }

    async fn transactions(&self, query: &TransactionQuery) -> LedgerResult<Vec<PointTransaction>> {
        let state = self.state.lock().await;
        let skip = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(query.page_size(crate::ledger::models::DEFAULT_PAGE_SIZE))
            .unwrap_or(usize::MAX);

        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| query.matches(tx))
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn history(&self, user_id: UserId) -> LedgerResult<Vec<PointTransaction>> {
        let state = self.state.lock().await;
        state.user(user_id)?;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn apply(&self, entry: NewTransaction) -> LedgerResult<PointTransaction> {
        let mut state = self.state.lock().await;
        state.append(entry, Utc::now())
    }
}

#[async_trait]
impl ResourceRepository for MemoryStore {
    async fn create_resource(
        &self,
        author_id: UserId,
        resource: &NewResource,
    ) -> ResourceResult<Resource> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&author_id) {
            return Err(ResourceError::UserNotFound(author_id));
        }

        let created = Resource {
            id: next_id(&mut state.next_resource_id),
            title: resource.title.clone(),
            description: resource.description.clone(),
            content: Some(resource.content.clone()),
            author_id,
            is_free: resource.is_free,
            points_required: resource.points_required,
            created_at: Utc::now(),
        };
        state.resources.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_resource(&self, resource_id: ResourceId) -> ResourceResult<Option<Resource>> {
        let state = self.state.lock().await;
        Ok(state.resources.get(&resource_id).cloned())
    }

    async fn unlocked_resource_ids(&self, user_id: UserId) -> ResourceResult<BTreeSet<ResourceId>> {
        let state = self.state.lock().await;
        Ok(state
            .unlocks
            .keys()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, resource_id)| *resource_id)
            .collect())
    }

    async fn purchase(&self, user_id: UserId, resource: &Resource) -> ResourceResult<PurchaseReceipt> {
        let mut state = self.state.lock().await;

        if state.unlocks.contains_key(&(user_id, resource.id)) {
            return Err(ResourceError::AlreadyUnlocked(resource.id));
        }

        let now = Utc::now();
        let tx = state.append(
            NewTransaction {
                user_id,
                transaction_type: TransactionType::Purchase,
                amount: -resource.points_required,
                description: format!("Purchase: {}", resource.title),
                reference_id: Some(purchase_reference(resource.id)),
            },
            now,
        )?;

        let unlock = UnlockRecord {
            user_id,
            resource_id: resource.id,
            transaction_id: tx.id,
            unlocked_at: now,
        };
        state.unlocks.insert((user_id, resource.id), unlock.clone());

        Ok(PurchaseReceipt {
            resource_id: resource.id,
            charged: resource.points_required,
            balance: tx.balance_after,
            transaction: Some(tx),
            unlock: Some(unlock),
        })
    }
}

#[async_trait]
impl RechargeRepository for MemoryStore {
    async fn list_plans(&self, include_inactive: bool) -> RechargeResult<Vec<RechargePlan>> {
        let state = self.state.lock().await;
        let mut plans: Vec<RechargePlan> = state
            .plans
            .values()
            .filter(|plan| include_inactive || plan.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|plan| (plan.order, plan.id));
        Ok(plans)
    }

    async fn find_plan(&self, plan_id: PlanId) -> RechargeResult<Option<RechargePlan>> {
        let state = self.state.lock().await;
        Ok(state.plans.get(&plan_id).cloned())
    }

    async fn create_plan(&self, plan: &NewRechargePlan) -> RechargeResult<RechargePlan> {
        let mut state = self.state.lock().await;
        let created = RechargePlan {
            id: next_id(&mut state.next_plan_id),
            name: plan.name.clone(),
            plan_type: plan.plan_type.clone(),
            points: plan.points,
            price: plan.price,
            description: plan.description.clone(),
            features: plan.features.clone(),
            wechat_qr_code: plan.wechat_qr_code.clone(),
            alipay_qr_code: plan.alipay_qr_code.clone(),
            is_active: plan.is_active,
            is_featured: plan.is_featured,
            order: plan.order,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.plans.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_plan(&self, plan: &RechargePlan) -> RechargeResult<RechargePlan> {
        let mut state = self.state.lock().await;
        let stored = state
            .plans
            .get_mut(&plan.id)
            .ok_or(RechargeError::PlanNotFound(plan.id))?;
        *stored = plan.clone();
        Ok(stored.clone())
    }

    async fn delete_plan(&self, plan_id: PlanId) -> RechargeResult<bool> {
        let mut state = self.state.lock().await;
        if state.plans.remove(&plan_id).is_none() {
            return Ok(false);
        }
        for order in state.orders.values_mut() {
            if order.plan_id == Some(plan_id) {
                order.plan_id = None;
            }
        }
        Ok(true)
    }

    async fn create_order(
        &self,
        user_id: UserId,
        order_no: &str,
        order: &NewRechargeOrder,
    ) -> RechargeResult<RechargeOrder> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(RechargeError::UserNotFound(user_id));
        }

        let created = RechargeOrder {
            id: next_id(&mut state.next_order_id),
            order_no: order_no.to_string(),
            user_id,
            plan_id: order.plan_id,
            amount: order.amount,
            points: order.points,
            payment_method: order.payment_method,
            status: OrderStatus::Pending,
            payment_proof: order.payment_proof.clone(),
            admin_note: None,
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_order(&self, order_id: OrderId) -> RechargeResult<Option<RechargeOrder>> {
        let state = self.state.lock().await;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn list_orders(
        &self,
        user_id: Option<UserId>,
        status: Option<OrderStatus>,
    ) -> RechargeResult<Vec<RechargeOrder>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .rev()
            .filter(|o| user_id.is_none_or(|id| o.user_id == id))
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect())
    }

    async fn review_order(
        &self,
        order_id: OrderId,
        approver: UserId,
        review: &OrderReview,
        now: DateTime<Utc>,
    ) -> RechargeResult<RechargeOrder> {
        let mut state = self.state.lock().await;

        let mut order = state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(RechargeError::OrderNotFound(order_id))?;

        if order.apply_review(approver, review, now)? == ReviewOutcome::Approved {
            let total_recharged = state
                .user(order.user_id)?
                .total_recharged
                .checked_add(order.amount)
                .ok_or(LedgerError::BalanceOverflow)?;

            state.append(
                NewTransaction {
                    user_id: order.user_id,
                    transaction_type: TransactionType::Recharge,
                    amount: order.points,
                    description: recharge_description(&order.order_no),
                    reference_id: Some(order.order_no.clone()),
                },
                now,
            )?;

            if let Some((user, _)) = state.users.get_mut(&order.user_id) {
                user.total_recharged = total_recharged;
            }
        }

        state.orders.insert(order_id, order.clone());
        Ok(order)
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn health_check(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: name.to_string(),
            password_hash: "hash".to_string(),
            display_name: name.to_string(),
            email: email.map(str::to_string),
            role: UserRole::User,
        }
    }

    #[tokio::test]
    async fn test_zero_reward_writes_no_entry() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a_user", None), 0).await.unwrap();
        assert_eq!(user.points, 0);
        assert!(store.history(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryStore::new();
        store
            .create_user(new_user("first", Some("x@example.com")), 0)
            .await
            .unwrap();
        assert!(matches!(
            store
                .create_user(new_user("second", Some("x@example.com")), 0)
                .await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_no_trace() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a_user", None), 10).await.unwrap();

        let err = store
            .apply(NewTransaction {
                user_id: user.id,
                transaction_type: TransactionType::AdminAdjust,
                amount: -11,
                description: String::new(),
                reference_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(store.history(user.id).await.unwrap().len(), 1);
        assert_eq!(store.balance(user.id).await.unwrap().balance, 10);
    }

    #[tokio::test]
    async fn test_transactions_paginate_newest_first() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a_user", None), 0).await.unwrap();
        for amount in 1..=5 {
            store
                .apply(NewTransaction {
                    user_id: user.id,
                    transaction_type: TransactionType::AdminAdjust,
                    amount,
                    description: String::new(),
                    reference_id: None,
                })
                .await
                .unwrap();
        }

        let page = store
            .transactions(&TransactionQuery {
                user_id: Some(user.id),
                skip: Some(1),
                limit: Some(2),
                ..TransactionQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.iter().map(|tx| tx.amount).collect::<Vec<_>>(), vec![4, 3]);
    }
}
