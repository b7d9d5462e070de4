//! Points ledger API handlers.

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use paywall::{
    auth::{Actor, UserId},
    ledger::{
        AdjustRequest, LedgerAudit, LedgerError, PointTransaction, PointsBalance, TransactionQuery,
    },
};
use serde::Deserialize;

use super::{AppState, errors::ApiResult};
use crate::logging;

/// Target of an admin-only per-user operation
#[derive(Debug, Deserialize)]
pub struct UserParam {
    pub user_id: UserId,
}

/// The caller's balance and lifetime recharge total.
pub async fn balance(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<PointsBalance>> {
    Ok(Json(state.ledger_manager.balance(actor.user_id).await?))
}

/// The caller's transactions, newest first (`?skip&limit&transaction_type`).
pub async fn transactions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Json<Vec<PointTransaction>>> {
    let entries = state
        .ledger_manager
        .transactions(actor.user_id, query)
        .await?;
    Ok(Json(entries))
}

/// Transactions across all users (admin only, `?skip&limit&user_id&transaction_type`).
pub async fn admin_transactions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Json<Vec<PointTransaction>>> {
    let entries = state
        .ledger_manager
        .admin_transactions(&actor, query)
        .await
        .inspect_err(|err| forbidden_event(&actor, err, "admin_transactions"))?;
    Ok(Json(entries))
}

/// Manual correction of a user's balance (admin only, `?user_id=`).
///
/// # Request Body
///
/// ```json
/// {"type": "ADMIN_ADJUST", "amount": -50, "description": "Duplicate payment", "reference_id": null}
/// ```
pub async fn admin_adjust(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(target): Query<UserParam>,
    Json(request): Json<AdjustRequest>,
) -> ApiResult<(StatusCode, Json<PointTransaction>)> {
    let entry = state
        .ledger_manager
        .adjust(&actor, target.user_id, request)
        .await
        .inspect_err(|err| forbidden_event(&actor, err, "admin_adjust"))?;

    logging::log_ledger_event("adjust", entry.user_id, entry.amount, entry.balance_after);
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Replay a user's ledger against the stored balance (admin only, `?user_id=`).
pub async fn admin_audit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(target): Query<UserParam>,
) -> ApiResult<Json<LedgerAudit>> {
    if !actor.is_admin() {
        let err = LedgerError::Forbidden;
        forbidden_event(&actor, &err, "admin_audit");
        return Err(err.into());
    }
    Ok(Json(state.ledger_manager.audit(target.user_id).await?))
}

fn forbidden_event(actor: &Actor, err: &LedgerError, operation: &str) {
    if matches!(err, LedgerError::Forbidden) {
        logging::log_security_event(
            "forbidden_admin_call",
            Some(actor.user_id),
            None,
            operation,
        );
    }
}
