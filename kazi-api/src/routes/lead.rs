//! Sales lead routes.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use kazi_core::EntityId;
use serde::{Deserialize, Serialize};

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::{Lead, LeadStats},
    state::AppState,
};

use super::generic::{crud_routes, StatsQuery};

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AssignLeadRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub assignee_id: EntityId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoseLeadRequest {
    pub reason: Option<String>,
}

/// POST /api/v1/leads/:id/assign
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/leads/{id}/assign",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "Lead ID")),
    request_body = AssignLeadRequest,
    responses(
        (status = 200, description = "Lead assigned", body = ActionResult<Lead>),
        (status = 404, description = "Lead not found", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn assign_lead(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    Json(req): Json<AssignLeadRequest>,
) -> ApiResult<ActionResult<Lead>> {
    let lead = state
        .gateway::<Lead>()
        .assign(auth.principal, id, req.assignee_id)
        .await?;
    Ok(ActionResult::ok(lead))
}

pub async fn contact_lead(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Lead>> {
    Ok(ActionResult::ok(
        state.gateway::<Lead>().contact(auth.principal, id).await?,
    ))
}

pub async fn qualify_lead(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Lead>> {
    Ok(ActionResult::ok(
        state.gateway::<Lead>().qualify(auth.principal, id).await?,
    ))
}

pub async fn win_lead(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Lead>> {
    Ok(ActionResult::ok(
        state.gateway::<Lead>().mark_won(auth.principal, id).await?,
    ))
}

pub async fn lose_lead(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<LoseLeadRequest>>,
) -> ApiResult<ActionResult<Lead>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    Ok(ActionResult::ok(
        state
            .gateway::<Lead>()
            .mark_lost(auth.principal, id, req.reason)
            .await?,
    ))
}

/// GET /api/v1/leads/stats
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/leads/stats",
    tag = "Leads",
    params(StatsQuery),
    responses(
        (status = 200, description = "Lead pipeline summary", body = ActionResult<LeadStats>),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn lead_stats(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(query): Query<StatsQuery>,
) -> ApiResult<ActionResult<LeadStats>> {
    let stats = state
        .gateway::<Lead>()
        .stats(auth.principal, query.cap_for::<Lead>())
        .await?;
    Ok(ActionResult::ok(stats))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<Lead>()
        .route("/stats", get(lead_stats))
        .route("/:id/assign", post(assign_lead))
        .route("/:id/contact", post(contact_lead))
        .route("/:id/qualify", post(qualify_lead))
        .route("/:id/won", post(win_lead))
        .route("/:id/lost", post(lose_lead))
}
