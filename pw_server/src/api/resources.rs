//! Resource API handlers: publishing, paywalled viewing and purchase.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use paywall::{
    auth::Actor,
    resources::{
        NewResource, PurchaseResponse, Resource, ResourceError, ResourceId, ResourceView,
    },
};

use super::{AppState, errors::ApiResult, middleware::optional_actor};
use crate::{logging, metrics};

/// Publish a resource authored by the caller.
///
/// # Errors
///
/// - `400 Bad Request`: Empty title, or a priced resource without a price
pub async fn create_resource(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewResource>,
) -> ApiResult<(StatusCode, Json<Resource>)> {
    let resource = state.resource_manager.create(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

/// View a resource. Authentication is optional.
///
/// `content` is only included when the resource is free, the caller has
/// unlocked it, or the caller is its author or an administrator.
pub async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
    headers: HeaderMap,
) -> ApiResult<Json<ResourceView>> {
    let viewer = optional_actor(&state, &headers);
    let view = state
        .resource_manager
        .view(resource_id, viewer.as_ref())
        .await?;
    Ok(Json(view))
}

/// Spend points to unlock a resource.
///
/// # Response
///
/// ```json
/// {"success": true, "balance": 900, "message": "Purchase successful, 100 points spent"}
/// ```
///
/// # Errors
///
/// - `402 Payment Required`: Balance below the price (body carries `balance` and `required`)
/// - `404 Not Found`: Unknown resource
/// - `409 Conflict`: Already unlocked; nothing was charged
pub async fn purchase_resource(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(resource_id): Path<ResourceId>,
) -> ApiResult<Json<PurchaseResponse>> {
    match state.resource_manager.purchase(&actor, resource_id).await {
        Ok(receipt) => {
            if let Some(entry) = &receipt.transaction {
                metrics::purchases_total("charged");
                metrics::points_spent(receipt.charged);
                logging::log_ledger_event(
                    "purchase",
                    actor.user_id,
                    entry.amount,
                    entry.balance_after,
                );
            } else {
                metrics::purchases_total("free");
            }
            Ok(Json(PurchaseResponse::from(&receipt)))
        }
        Err(err) => {
            match &err {
                ResourceError::AlreadyUnlocked(_) => metrics::purchases_total("already_unlocked"),
                ResourceError::InsufficientBalance { .. } => {
                    metrics::purchases_total("insufficient")
                }
                _ => {}
            }
            Err(err.into())
        }
    }
}
