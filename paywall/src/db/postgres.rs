//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use super::repository::{
    HealthCheck, LedgerRepository, RechargeRepository, ResourceRepository, UserRepository,
};
use crate::auth::{AuthError, AuthResult, NewUser, User, UserId, UserRole};
use crate::ledger::{
    LedgerError, LedgerResult, NewTransaction, PointTransaction, PointsBalance, TransactionQuery,
    TransactionType, models::DEFAULT_PAGE_SIZE, next_balance,
};
use crate::recharge::{
    NewRechargeOrder, NewRechargePlan, OrderId, OrderReview, OrderStatus, PlanId, RechargeError,
    RechargeOrder, RechargePlan, RechargeResult, ReviewOutcome, recharge_description,
};
use crate::resources::{
    NewResource, PurchaseReceipt, Resource, ResourceError, ResourceId, ResourceResult,
    UnlockRecord, purchase_reference,
};

const USER_COLUMNS: &str = "id, username, display_name, email, role, points, total_recharged, \
                            is_active, created_at, last_login";

const TRANSACTION_COLUMNS: &str =
    "id, user_id, transaction_type, amount, balance_after, description, reference_id, created_at";

const RESOURCE_COLUMNS: &str =
    "id, title, description, content, author_id, is_free, points_required, created_at";

const PLAN_COLUMNS: &str = "id, name, plan_type, points, price, description, features, \
                            wechat_qr_code, alipay_qr_code, is_active, is_featured, sort_order, \
                            created_at, updated_at";

const ORDER_COLUMNS: &str = "id, order_no, user_id, plan_id, amount, points, payment_method, \
                             status, payment_proof, admin_note, approved_by, approved_at, \
                             created_at, updated_at";

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        role: parse_column(row, "role")?,
        points: row.try_get("points")?,
        total_recharged: row.try_get("total_recharged")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        last_login: row.try_get("last_login")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<PointTransaction, sqlx::Error> {
    Ok(PointTransaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        transaction_type: parse_column(row, "transaction_type")?,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        description: row.try_get("description")?,
        reference_id: row.try_get("reference_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn resource_from_row(row: &PgRow) -> Result<Resource, sqlx::Error> {
    Ok(Resource {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        is_free: row.try_get("is_free")?,
        points_required: row.try_get("points_required")?,
        created_at: row.try_get("created_at")?,
    })
}

fn plan_from_row(row: &PgRow) -> Result<RechargePlan, sqlx::Error> {
    let plan_type: Option<String> = row.try_get("plan_type")?;
    Ok(RechargePlan {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        plan_type: plan_type.unwrap_or_default(),
        points: row.try_get("points")?,
        price: row.try_get("price")?,
        description: row.try_get("description")?,
        features: row.try_get("features")?,
        wechat_qr_code: row.try_get("wechat_qr_code")?,
        alipay_qr_code: row.try_get("alipay_qr_code")?,
        is_active: row.try_get("is_active")?,
        is_featured: row.try_get("is_featured")?,
        order: row.try_get("sort_order")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<RechargeOrder, sqlx::Error> {
    Ok(RechargeOrder {
        id: row.try_get("id")?,
        order_no: row.try_get("order_no")?,
        user_id: row.try_get("user_id")?,
        plan_id: row.try_get("plan_id")?,
        amount: row.try_get("amount")?,
        points: row.try_get("points")?,
        payment_method: parse_column(row, "payment_method")?,
        status: parse_column(row, "status")?,
        payment_proof: row.try_get("payment_proof")?,
        admin_note: row.try_get("admin_note")?,
        approved_by: row.try_get("approved_by")?,
        approved_at: row.try_get("approved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Lock the user row and return its balance
async fn lock_balance(tx: &mut Transaction<'_, Postgres>, user_id: UserId) -> LedgerResult<i64> {
    let row = sqlx::query("SELECT points FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::UserNotFound(user_id))?;

    Ok(row.get("points"))
}

/// Append a ledger entry inside an open transaction
async fn append_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: NewTransaction,
) -> LedgerResult<PointTransaction> {
    let current = lock_balance(tx, entry.user_id).await?;
    let balance_after = next_balance(current, entry.amount)?;

    sqlx::query("UPDATE users SET points = $1 WHERE id = $2")
        .bind(balance_after)
        .bind(entry.user_id)
        .execute(&mut **tx)
        .await?;

    let row = sqlx::query(&format!(
        "INSERT INTO point_transactions
             (user_id, transaction_type, amount, balance_after, description, reference_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(entry.user_id)
    .bind(entry.transaction_type.to_string())
    .bind(entry.amount)
    .bind(balance_after)
    .bind(&entry.description)
    .bind(&entry.reference_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(transaction_from_row(&row)?)
}

fn map_user_conflict(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(c) if c.contains("email") => AuthError::EmailTaken,
                _ => AuthError::UsernameTaken,
            };
        }
    }
    AuthError::Database(err)
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, user: NewUser, register_reward: i64) -> AuthResult<User> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM users WHERE username = $1")
            .bind(&user.username)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        if let Some(email) = &user.email {
            let existing = sqlx::query("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?;
            if existing.is_some() {
                return Err(AuthError::EmailTaken);
            }
        }

        let row = sqlx::query(&format!(
            "INSERT INTO users (username, password_hash, display_name, email, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.role.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_user_conflict)?;
        let mut created = user_from_row(&row)?;

        if register_reward > 0 {
            let entry = append_entry(
                &mut tx,
                NewTransaction {
                    user_id: created.id,
                    transaction_type: TransactionType::Register,
                    amount: register_reward,
                    description: "Registration reward".to_string(),
                    reference_id: None,
                },
            )
            .await
            .map_err(|e| match e {
                LedgerError::Database(db) => AuthError::Database(db),
                _ => AuthError::UserNotFound,
            })?;
            created.points = entry.balance_after;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn find_credentials(&self, username: &str) -> AuthResult<Option<(User, String)>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => Ok(Some((user_from_row(&row)?, row.try_get("password_hash")?))),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn update_last_login(&self, user_id: UserId) -> AuthResult<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn set_role(&self, user_id: UserId, role: UserRole) -> AuthResult<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET role = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(role.to_string())
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(AuthError::UserNotFound)?;

        Ok(user_from_row(&row)?)
    }
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn balance(&self, user_id: UserId) -> LedgerResult<PointsBalance> {
        let row = sqlx::query("SELECT points, total_recharged FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))?;

        Ok(PointsBalance {
            user_id,
            balance: row.get("points"),
            total_recharged: row.get("total_recharged"),
        })
    }

    async fn transactions(&self, query: &TransactionQuery) -> LedgerResult<Vec<PointTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM point_transactions
             WHERE ($1::BIGINT IS NULL OR user_id = $1)
               AND ($2::VARCHAR IS NULL OR transaction_type = $2)
             ORDER BY created_at DESC, id DESC
             OFFSET $3 LIMIT $4"
        ))
        .bind(query.user_id)
        .bind(query.transaction_type.map(|t| t.to_string()))
        .bind(query.offset())
        .bind(query.page_size(DEFAULT_PAGE_SIZE))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<_, _>>()?)
    }

    async fn history(&self, user_id: UserId) -> LedgerResult<Vec<PointTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM point_transactions
             WHERE user_id = $1
             ORDER BY id ASC"
        ))
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<_, _>>()?)
    }

    async fn apply(&self, entry: NewTransaction) -> LedgerResult<PointTransaction> {
        let mut tx = self.pool.begin().await?;
        let created = append_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(created)
    }
}

#[async_trait]
impl ResourceRepository for PgStore {
    async fn create_resource(
        &self,
        author_id: UserId,
        resource: &NewResource,
    ) -> ResourceResult<Resource> {
        let row = sqlx::query(&format!(
            "INSERT INTO resources (title, description, content, author_id, is_free, points_required)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {RESOURCE_COLUMNS}"
        ))
        .bind(&resource.title)
        .bind(&resource.description)
        .bind(&resource.content)
        .bind(author_id)
        .bind(resource.is_free)
        .bind(resource.points_required)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(resource_from_row(&row)?)
    }

    async fn find_resource(&self, resource_id: ResourceId) -> ResourceResult<Option<Resource>> {
        let row = sqlx::query(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1"))
            .bind(resource_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(resource_from_row).transpose()?)
    }

    async fn unlocked_resource_ids(&self, user_id: UserId) -> ResourceResult<BTreeSet<ResourceId>> {
        let rows = sqlx::query("SELECT resource_id FROM resource_unlocks WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.iter().map(|row| row.get("resource_id")).collect())
    }

    async fn purchase(&self, user_id: UserId, resource: &Resource) -> ResourceResult<PurchaseReceipt> {
        let mut tx = self.pool.begin().await?;

        // Serialises concurrent purchases by the same user.
        lock_balance(&mut tx, user_id).await?;

        let owned = sqlx::query(
            "SELECT 1 AS owned FROM resource_unlocks WHERE user_id = $1 AND resource_id = $2",
        )
        .bind(user_id)
        .bind(resource.id)
        .fetch_optional(&mut *tx)
        .await?;
        if owned.is_some() {
            return Err(ResourceError::AlreadyUnlocked(resource.id));
        }

        let entry = append_entry(
            &mut tx,
            NewTransaction {
                user_id,
                transaction_type: TransactionType::Purchase,
                amount: -resource.points_required,
                description: format!("Purchase: {}", resource.title),
                reference_id: Some(purchase_reference(resource.id)),
            },
        )
        .await?;

        let row = sqlx::query(
            "INSERT INTO resource_unlocks (user_id, resource_id, transaction_id)
             VALUES ($1, $2, $3)
             RETURNING unlocked_at",
        )
        .bind(user_id)
        .bind(resource.id)
        .bind(entry.id)
        .fetch_one(&mut *tx)
        .await?;

        let unlock = UnlockRecord {
            user_id,
            resource_id: resource.id,
            transaction_id: entry.id,
            unlocked_at: row.get("unlocked_at"),
        };

        tx.commit().await?;

        Ok(PurchaseReceipt {
            resource_id: resource.id,
            charged: resource.points_required,
            balance: entry.balance_after,
            transaction: Some(entry),
            unlock: Some(unlock),
        })
    }
}

#[async_trait]
impl RechargeRepository for PgStore {
    async fn list_plans(&self, include_inactive: bool) -> RechargeResult<Vec<RechargePlan>> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAN_COLUMNS} FROM recharge_plans
             WHERE $1 OR is_active
             ORDER BY sort_order ASC, id ASC"
        ))
        .bind(include_inactive)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(plan_from_row).collect::<Result<_, _>>()?)
    }

    async fn find_plan(&self, plan_id: PlanId) -> RechargeResult<Option<RechargePlan>> {
        let row = sqlx::query(&format!("SELECT {PLAN_COLUMNS} FROM recharge_plans WHERE id = $1"))
            .bind(plan_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(plan_from_row).transpose()?)
    }

    async fn create_plan(&self, plan: &NewRechargePlan) -> RechargeResult<RechargePlan> {
        let row = sqlx::query(&format!(
            "INSERT INTO recharge_plans
                 (name, plan_type, points, price, description, features, wechat_qr_code,
                  alipay_qr_code, is_active, is_featured, sort_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {PLAN_COLUMNS}"
        ))
        .bind(&plan.name)
        .bind(&plan.plan_type)
        .bind(plan.points)
        .bind(plan.price)
        .bind(&plan.description)
        .bind(&plan.features)
        .bind(&plan.wechat_qr_code)
        .bind(&plan.alipay_qr_code)
        .bind(plan.is_active)
        .bind(plan.is_featured)
        .bind(plan.order)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(plan_from_row(&row)?)
    }

    async fn update_plan(&self, plan: &RechargePlan) -> RechargeResult<RechargePlan> {
        let row = sqlx::query(&format!(
            "UPDATE recharge_plans
             SET name = $2, plan_type = $3, points = $4, price = $5, description = $6,
                 features = $7, wechat_qr_code = $8, alipay_qr_code = $9, is_active = $10,
                 is_featured = $11, sort_order = $12, updated_at = $13
             WHERE id = $1
             RETURNING {PLAN_COLUMNS}"
        ))
        .bind(plan.id)
        .bind(&plan.name)
        .bind(&plan.plan_type)
        .bind(plan.points)
        .bind(plan.price)
        .bind(&plan.description)
        .bind(&plan.features)
        .bind(&plan.wechat_qr_code)
        .bind(&plan.alipay_qr_code)
        .bind(plan.is_active)
        .bind(plan.is_featured)
        .bind(plan.order)
        .bind(plan.updated_at)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(RechargeError::PlanNotFound(plan.id))?;

        Ok(plan_from_row(&row)?)
    }

    async fn delete_plan(&self, plan_id: PlanId) -> RechargeResult<bool> {
        let result = sqlx::query("DELETE FROM recharge_plans WHERE id = $1")
            .bind(plan_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_order(
        &self,
        user_id: UserId,
        order_no: &str,
        order: &NewRechargeOrder,
    ) -> RechargeResult<RechargeOrder> {
        let row = sqlx::query(&format!(
            "INSERT INTO recharge_orders
                 (order_no, user_id, plan_id, amount, points, payment_method, status, payment_proof)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_no)
        .bind(user_id)
        .bind(order.plan_id)
        .bind(order.amount)
        .bind(order.points)
        .bind(order.payment_method.to_string())
        .bind(OrderStatus::Pending.to_string())
        .bind(&order.payment_proof)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(order_from_row(&row)?)
    }

    async fn find_order(&self, order_id: OrderId) -> RechargeResult<Option<RechargeOrder>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM recharge_orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.as_ref().map(order_from_row).transpose()?)
    }

    async fn list_orders(
        &self,
        user_id: Option<UserId>,
        status: Option<OrderStatus>,
    ) -> RechargeResult<Vec<RechargeOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM recharge_orders
             WHERE ($1::BIGINT IS NULL OR user_id = $1)
               AND ($2::VARCHAR IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .bind(status.map(|s| s.to_string()))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.iter().map(order_from_row).collect::<Result<_, _>>()?)
    }

    async fn review_order(
        &self,
        order_id: OrderId,
        approver: UserId,
        review: &OrderReview,
        now: DateTime<Utc>,
    ) -> RechargeResult<RechargeOrder> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM recharge_orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RechargeError::OrderNotFound(order_id))?;
        let mut order = order_from_row(&row)?;

        if order.apply_review(approver, review, now)? == ReviewOutcome::Approved {
            append_entry(
                &mut tx,
                NewTransaction {
                    user_id: order.user_id,
                    transaction_type: TransactionType::Recharge,
                    amount: order.points,
                    description: recharge_description(&order.order_no),
                    reference_id: Some(order.order_no.clone()),
                },
            )
            .await?;

            sqlx::query("UPDATE users SET total_recharged = total_recharged + $1 WHERE id = $2")
                .bind(order.amount)
                .bind(order.user_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE recharge_orders
             SET status = $2, admin_note = $3, approved_by = $4, approved_at = $5, updated_at = $6
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.to_string())
        .bind(&order.admin_note)
        .bind(order.approved_by)
        .bind(order.approved_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }
}

#[async_trait]
impl HealthCheck for PgStore {
    async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }
}
