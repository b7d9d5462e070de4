//! Repository trait definitions for testability and dependency injection.
//!
//! Operations that move points (`create_user` with a reward, `apply`,
//! `purchase`, `review_order`) must be atomic: either every row they describe
//! is written, or none is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::auth::{AuthResult, NewUser, User, UserId, UserRole};
use crate::ledger::{LedgerResult, NewTransaction, PointTransaction, PointsBalance, TransactionQuery};
use crate::recharge::{
    NewRechargeOrder, NewRechargePlan, OrderId, OrderReview, OrderStatus, PlanId, RechargeOrder,
    RechargePlan, RechargeResult,
};
use crate::resources::{NewResource, PurchaseReceipt, Resource, ResourceId, ResourceResult};

/// Trait for user repository operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and, when `register_reward > 0`, its REGISTER transaction
    ///
    /// Fails with `UsernameTaken` / `EmailTaken` on conflicts.
    async fn create_user(&self, user: NewUser, register_reward: i64) -> AuthResult<User>;

    /// User and password hash by username
    async fn find_credentials(&self, username: &str) -> AuthResult<Option<(User, String)>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Update user's last login timestamp
    async fn update_last_login(&self, user_id: UserId) -> AuthResult<()>;

    /// Change a user's role
    async fn set_role(&self, user_id: UserId, role: UserRole) -> AuthResult<User>;
}

/// Trait for points ledger operations
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Current balance; `UserNotFound` for unknown users
    async fn balance(&self, user_id: UserId) -> LedgerResult<PointsBalance>;

    /// Filtered page of entries, newest first
    async fn transactions(&self, query: &TransactionQuery) -> LedgerResult<Vec<PointTransaction>>;

    /// Every entry of a user, oldest first
    async fn history(&self, user_id: UserId) -> LedgerResult<Vec<PointTransaction>>;

    /// Append an entry and update the balance atomically
    async fn apply(&self, entry: NewTransaction) -> LedgerResult<PointTransaction>;
}

/// Trait for resource and unlock operations
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn create_resource(
        &self,
        author_id: UserId,
        resource: &NewResource,
    ) -> ResourceResult<Resource>;

    async fn find_resource(&self, resource_id: ResourceId) -> ResourceResult<Option<Resource>>;

    /// IDs of resources the user holds an unlock record for
    async fn unlocked_resource_ids(&self, user_id: UserId) -> ResourceResult<BTreeSet<ResourceId>>;

    /// Debit `resource.points_required` and record the unlock atomically
    ///
    /// Fails with `AlreadyUnlocked` or `InsufficientBalance` without writing.
    async fn purchase(&self, user_id: UserId, resource: &Resource) -> ResourceResult<PurchaseReceipt>;
}

/// Trait for recharge plan and order operations
#[async_trait]
pub trait RechargeRepository: Send + Sync {
    /// Plans sorted by `order`, then id
    async fn list_plans(&self, include_inactive: bool) -> RechargeResult<Vec<RechargePlan>>;

    async fn find_plan(&self, plan_id: PlanId) -> RechargeResult<Option<RechargePlan>>;

    async fn create_plan(&self, plan: &NewRechargePlan) -> RechargeResult<RechargePlan>;

    /// Persist every field of an existing plan
    async fn update_plan(&self, plan: &RechargePlan) -> RechargeResult<RechargePlan>;

    /// Returns false when no such plan existed
    async fn delete_plan(&self, plan_id: PlanId) -> RechargeResult<bool>;

    /// Insert a PENDING order
    async fn create_order(
        &self,
        user_id: UserId,
        order_no: &str,
        order: &NewRechargeOrder,
    ) -> RechargeResult<RechargeOrder>;

    async fn find_order(&self, order_id: OrderId) -> RechargeResult<Option<RechargeOrder>>;

    /// Orders newest first, optionally filtered by owner and status
    async fn list_orders(
        &self,
        user_id: Option<UserId>,
        status: Option<OrderStatus>,
    ) -> RechargeResult<Vec<RechargeOrder>>;

    /// Apply a review; an approval credits the order in the same atomic unit
    async fn review_order(
        &self,
        order_id: OrderId,
        approver: UserId,
        review: &OrderReview,
        now: DateTime<Utc>,
    ) -> RechargeResult<RechargeOrder>;
}

/// Storage liveness probe
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> Result<(), sqlx::Error>;
}

/// Everything the server needs from a storage backend
pub trait Store:
    UserRepository + LedgerRepository + ResourceRepository + RechargeRepository + HealthCheck
{
}

impl<T> Store for T where
    T: UserRepository + LedgerRepository + ResourceRepository + RechargeRepository + HealthCheck
{
}
