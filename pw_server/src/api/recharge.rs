//! Recharge plan and order API handlers.
//!
//! Orders only record a user's claim of an off-platform payment. Points move
//! when an administrator approves the order.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use paywall::{
    auth::Actor,
    recharge::{
        NewRechargeOrder, NewRechargePlan, OrderId, OrderReview, OrderStatus, PlanId,
        RechargeError, RechargeOrder, RechargePlan, RechargePlanUpdate,
    },
};
use serde::Deserialize;

use super::{AppState, errors::ApiResult};
use crate::{logging, metrics};

#[derive(Debug, Default, Deserialize)]
pub struct PlanListParams {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub status: Option<OrderStatus>,
}

/// Plans sorted by display order (`?include_inactive=true` to show all).
pub async fn list_plans(
    State(state): State<AppState>,
    Query(params): Query<PlanListParams>,
) -> ApiResult<Json<Vec<RechargePlan>>> {
    let plans = state
        .recharge_manager
        .list_plans(params.include_inactive)
        .await?;
    Ok(Json(plans))
}

/// Create a plan (admin only).
pub async fn create_plan(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewRechargePlan>,
) -> ApiResult<(StatusCode, Json<RechargePlan>)> {
    let plan = state
        .recharge_manager
        .create_plan(&actor, payload)
        .await
        .inspect_err(|err| forbidden_event(&actor, err, "create_plan"))?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// Partially update a plan (admin only).
pub async fn update_plan(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(plan_id): Path<PlanId>,
    Json(payload): Json<RechargePlanUpdate>,
) -> ApiResult<Json<RechargePlan>> {
    let plan = state
        .recharge_manager
        .update_plan(&actor, plan_id, payload)
        .await
        .inspect_err(|err| forbidden_event(&actor, err, "update_plan"))?;
    Ok(Json(plan))
}

/// Delete a plan (admin only). Orders keep their history with no plan reference.
pub async fn delete_plan(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(plan_id): Path<PlanId>,
) -> ApiResult<StatusCode> {
    state
        .recharge_manager
        .delete_plan(&actor, plan_id)
        .await
        .inspect_err(|err| forbidden_event(&actor, err, "delete_plan"))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record a pending order for the caller.
///
/// # Request Body
///
/// ```json
/// {"plan_id": 1, "amount": 1000, "points": 1000, "payment_method": "wechat", "payment_proof": null}
/// ```
pub async fn create_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewRechargeOrder>,
) -> ApiResult<(StatusCode, Json<RechargeOrder>)> {
    let order = state
        .recharge_manager
        .create_order(actor.user_id, payload)
        .await?;
    metrics::recharge_orders_total("created");
    Ok((StatusCode::CREATED, Json(order)))
}

/// The caller's orders, newest first.
pub async fn my_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<Vec<RechargeOrder>>> {
    Ok(Json(state.recharge_manager.my_orders(actor.user_id).await?))
}

/// All orders, newest first, optionally filtered by `?status=` (admin only).
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<OrderListParams>,
) -> ApiResult<Json<Vec<RechargeOrder>>> {
    let orders = state
        .recharge_manager
        .list_orders(&actor, params.status)
        .await
        .inspect_err(|err| forbidden_event(&actor, err, "list_orders"))?;
    Ok(Json(orders))
}

/// A single order, visible to its owner and administrators.
pub async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<OrderId>,
) -> ApiResult<Json<RechargeOrder>> {
    Ok(Json(state.recharge_manager.get_order(&actor, order_id).await?))
}

/// Approve, reject or annotate an order (admin only).
///
/// # Errors
///
/// - `400 Bad Request`: Empty review, or a rejection without `admin_note`
/// - `409 Conflict`: The order is already approved or rejected
pub async fn review_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<OrderId>,
    Json(review): Json<OrderReview>,
) -> ApiResult<Json<RechargeOrder>> {
    let decision = review.status;
    let order = state
        .recharge_manager
        .review_order(&actor, order_id, review)
        .await
        .inspect_err(|err| forbidden_event(&actor, err, "review_order"))?;

    match decision {
        Some(OrderStatus::Approved) => {
            metrics::recharge_orders_total("approved");
            metrics::points_recharged(order.points);
            match state.ledger_manager.balance(order.user_id).await {
                Ok(balance) => logging::log_ledger_event(
                    "recharge",
                    order.user_id,
                    order.points,
                    balance.balance,
                ),
                Err(err) => tracing::warn!("Balance lookup after approval failed: {}", err),
            }
        }
        Some(OrderStatus::Rejected) => metrics::recharge_orders_total("rejected"),
        _ => {}
    }

    Ok(Json(order))
}

fn forbidden_event(actor: &Actor, err: &RechargeError, operation: &str) {
    if matches!(err, RechargeError::Forbidden) {
        logging::log_security_event(
            "forbidden_admin_call",
            Some(actor.user_id),
            None,
            operation,
        );
    }
}
