//! Approval workflow routes.
//!
//! Decisions are only accepted while an approval is pending. A decision
//! attempt on an approval past its `expires_at` marks it expired and fails
//! with `STATE_CONFLICT`.

use axum::{extract::State, routing::post, Json, Router};
use kazi_core::EntityId;

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::{Approval, ApprovalDecision},
    state::AppState,
};

use super::generic::crud_routes;

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

fn decision(body: Option<Json<ApprovalDecision>>) -> ApprovalDecision {
    body.map(|Json(d)| d).unwrap_or_default()
}

/// POST /api/v1/approvals/:id/approve
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/approvals/{id}/approve",
    tag = "Approvals",
    params(("id" = Uuid, Path, description = "Approval ID")),
    request_body = ApprovalDecision,
    responses(
        (status = 200, description = "Approved", body = ActionResult<Approval>),
        (status = 404, description = "Approval not found", body = ApiError),
        (status = 409, description = "Not pending or expired", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn approve(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<ApprovalDecision>>,
) -> ApiResult<ActionResult<Approval>> {
    let approval = state
        .gateway::<Approval>()
        .approve(auth.principal, id, decision(body))
        .await?;
    Ok(ActionResult::ok(approval))
}

/// POST /api/v1/approvals/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<ApprovalDecision>>,
) -> ApiResult<ActionResult<Approval>> {
    let approval = state
        .gateway::<Approval>()
        .reject(auth.principal, id, decision(body))
        .await?;
    Ok(ActionResult::ok(approval))
}

/// POST /api/v1/approvals/:id/cancel
pub async fn cancel(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<ApprovalDecision>>,
) -> ApiResult<ActionResult<Approval>> {
    let approval = state
        .gateway::<Approval>()
        .cancel(auth.principal, id, decision(body))
        .await?;
    Ok(ActionResult::ok(approval))
}

/// POST /api/v1/approvals/expire - Sweep overdue pending approvals
pub async fn expire_overdue(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<ActionResult<Vec<Approval>>> {
    let expired = state.gateway::<Approval>().expire_overdue(auth.principal).await?;
    if !expired.is_empty() {
        tracing::info!(owner = %auth.principal, count = expired.len(), "Expired overdue approvals");
    }
    Ok(ActionResult::ok(expired))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<Approval>()
        .route("/expire", post(expire_overdue))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
        .route("/:id/cancel", post(cancel))
}
