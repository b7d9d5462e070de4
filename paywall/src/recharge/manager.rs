//! Recharge manager implementation.

use super::{
    errors::{RechargeError, RechargeResult},
    models::{
        NewRechargeOrder, NewRechargePlan, OrderId, OrderReview, OrderStatus, PlanId,
        RechargeOrder, RechargePlan, RechargePlanUpdate, generate_order_no,
    },
};
use crate::auth::{Actor, UserId};
use crate::db::RechargeRepository;
use chrono::Utc;
use std::sync::Arc;

/// Recharge manager
#[derive(Clone)]
pub struct RechargeManager {
    recharge: Arc<dyn RechargeRepository>,
}

impl RechargeManager {
    /// Create a new recharge manager
    pub fn new(recharge: Arc<dyn RechargeRepository>) -> Self {
        Self { recharge }
    }

    /// Plans sorted by `order`; inactive plans only when requested
    pub async fn list_plans(&self, include_inactive: bool) -> RechargeResult<Vec<RechargePlan>> {
        self.recharge.list_plans(include_inactive).await
    }

    pub async fn get_plan(&self, plan_id: PlanId) -> RechargeResult<RechargePlan> {
        self.recharge
            .find_plan(plan_id)
            .await?
            .ok_or(RechargeError::PlanNotFound(plan_id))
    }

    /// Create a plan (admin only)
    pub async fn create_plan(
        &self,
        actor: &Actor,
        plan: NewRechargePlan,
    ) -> RechargeResult<RechargePlan> {
        require_admin(actor)?;
        plan.validate()?;

        let created = self.recharge.create_plan(&plan).await?;
        log::info!("Admin {} created plan {} ({})", actor.user_id, created.id, created.name);
        Ok(created)
    }

    /// Partially update a plan (admin only)
    pub async fn update_plan(
        &self,
        actor: &Actor,
        plan_id: PlanId,
        update: RechargePlanUpdate,
    ) -> RechargeResult<RechargePlan> {
        require_admin(actor)?;

        let mut plan = self.get_plan(plan_id).await?;
        update.apply(&mut plan, Utc::now())?;

        let updated = self.recharge.update_plan(&plan).await?;
        log::info!("Admin {} updated plan {}", actor.user_id, plan_id);
        Ok(updated)
    }

    /// Delete a plan (admin only). Orders keep their amounts and lose the link.
    pub async fn delete_plan(&self, actor: &Actor, plan_id: PlanId) -> RechargeResult<()> {
        require_admin(actor)?;

        if !self.recharge.delete_plan(plan_id).await? {
            return Err(RechargeError::PlanNotFound(plan_id));
        }
        log::info!("Admin {} deleted plan {}", actor.user_id, plan_id);
        Ok(())
    }

    /// Record a user's claim of payment. Moves no points.
    ///
    /// # Errors
    ///
    /// * `RechargeError::InvalidOrder` - Non-positive amount/points, values that
    ///   disagree with the referenced plan, or a method the plan has no QR code for
    /// * `RechargeError::PlanNotFound` - Referenced plan does not exist
    pub async fn create_order(
        &self,
        user_id: UserId,
        order: NewRechargeOrder,
    ) -> RechargeResult<RechargeOrder> {
        if order.amount <= 0 || order.points <= 0 {
            return Err(RechargeError::InvalidOrder(
                "Amount and points must be positive".to_string(),
            ));
        }

        if let Some(plan_id) = order.plan_id {
            let plan = self.get_plan(plan_id).await?;
            if !plan.is_active {
                return Err(RechargeError::InvalidOrder(format!(
                    "Plan {plan_id} is not available"
                )));
            }
            if plan.price != order.amount || plan.points != order.points {
                return Err(RechargeError::InvalidOrder(format!(
                    "Amount and points must match plan {plan_id}"
                )));
            }
            if !plan.has_qr_code(order.payment_method) {
                return Err(RechargeError::InvalidOrder(format!(
                    "Payment method {} is not available for plan {plan_id}",
                    order.payment_method
                )));
            }
        }

        let order_no = generate_order_no(Utc::now());
        let created = self.recharge.create_order(user_id, &order_no, &order).await?;

        log::info!(
            "User {} created recharge order {} ({} points for {} via {})",
            user_id,
            created.order_no,
            created.points,
            created.amount,
            created.payment_method
        );

        Ok(created)
    }

    /// The caller's orders, newest first
    pub async fn my_orders(&self, user_id: UserId) -> RechargeResult<Vec<RechargeOrder>> {
        self.recharge.list_orders(Some(user_id), None).await
    }

    /// All orders, optionally filtered by status (admin only)
    pub async fn list_orders(
        &self,
        actor: &Actor,
        status: Option<OrderStatus>,
    ) -> RechargeResult<Vec<RechargeOrder>> {
        require_admin(actor)?;
        self.recharge.list_orders(None, status).await
    }

    /// A single order, visible to its owner and to administrators
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> RechargeResult<RechargeOrder> {
        let order = self
            .recharge
            .find_order(order_id)
            .await?
            .filter(|o| actor.is_admin() || o.user_id == actor.user_id)
            .ok_or(RechargeError::OrderNotFound(order_id))?;
        Ok(order)
    }

    /// Approve, reject or annotate an order (admin only)
    ///
    /// Approval and its RECHARGE credit are one atomic unit.
    ///
    /// # Errors
    ///
    /// * `RechargeError::Forbidden` - Caller is not an administrator
    /// * `RechargeError::OrderNotFound` - Order does not exist
    /// * `RechargeError::InvalidTransition` - Order already approved or rejected
    /// * `RechargeError::InvalidOrder` - Empty review, or rejection without a note
    pub async fn review_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        review: OrderReview,
    ) -> RechargeResult<RechargeOrder> {
        require_admin(actor)?;

        let order = self
            .recharge
            .review_order(order_id, actor.user_id, &review, Utc::now())
            .await?;

        match review.status {
            Some(_) => log::info!(
                "Admin {} set order {} to {} (user {}, {} points)",
                actor.user_id,
                order.order_no,
                order.status,
                order.user_id,
                order.points
            ),
            None => log::info!("Admin {} annotated order {}", actor.user_id, order.order_no),
        }

        Ok(order)
    }
}

fn require_admin(actor: &Actor) -> RechargeResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(RechargeError::Forbidden)
    }
}
