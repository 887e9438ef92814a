//! Invoice milestone routes: CRUD plus the delivery and review actions.

use axum::{extract::State, routing::post, Json, Router};
use kazi_core::EntityId;

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::{InvoiceMilestone, MilestoneDelivery, MilestoneReview},
    state::AppState,
};

use super::generic::crud_routes;

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

fn review(body: Option<Json<MilestoneReview>>) -> MilestoneReview {
    body.map(|Json(r)| r).unwrap_or_default()
}

/// POST /api/v1/invoice-milestones/:id/complete
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/invoice-milestones/{id}/complete",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Milestone ID")),
    request_body = MilestoneDelivery,
    responses(
        (status = 200, description = "Deliverables handed in", body = ActionResult<InvoiceMilestone>),
        (status = 404, description = "Milestone not found", body = ApiError),
        (status = 409, description = "Already completed or approved", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn complete_milestone(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<MilestoneDelivery>>,
) -> ApiResult<ActionResult<InvoiceMilestone>> {
    let delivery = body.map(|Json(d)| d).unwrap_or_default();
    let milestone = state
        .gateway::<InvoiceMilestone>()
        .complete(auth.principal, id, delivery)
        .await?;
    Ok(ActionResult::ok(milestone))
}

/// POST /api/v1/invoice-milestones/:id/approve
pub async fn approve_milestone(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<MilestoneReview>>,
) -> ApiResult<ActionResult<InvoiceMilestone>> {
    let milestone = state
        .gateway::<InvoiceMilestone>()
        .approve(auth.principal, id, review(body))
        .await?;
    Ok(ActionResult::ok(milestone))
}

/// POST /api/v1/invoice-milestones/:id/reject
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/invoice-milestones/{id}/reject",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Milestone ID")),
    request_body = MilestoneReview,
    responses(
        (status = 200, description = "Work rejected", body = ActionResult<InvoiceMilestone>),
        (status = 400, description = "Missing rejection note", body = ApiError),
        (status = 409, description = "Milestone not awaiting review", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn reject_milestone(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<MilestoneReview>>,
) -> ApiResult<ActionResult<InvoiceMilestone>> {
    let milestone = state
        .gateway::<InvoiceMilestone>()
        .reject(auth.principal, id, review(body))
        .await?;
    Ok(ActionResult::ok(milestone))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<InvoiceMilestone>()
        .route("/:id/complete", post(complete_milestone))
        .route("/:id/approve", post(approve_milestone))
        .route("/:id/reject", post(reject_milestone))
}
