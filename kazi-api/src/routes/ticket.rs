//! Support ticket routes.

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
    resources::{Ticket, TicketStats},
    state::AppState,
};

use super::generic::{crud_routes, StatsQuery};

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AssignTicketRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: EntityId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResolveTicketRequest {
    pub resolution: Option<String>,
}

/// POST /api/v1/tickets/:id/assign
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/tickets/{id}/assign",
    tag = "Tickets",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = AssignTicketRequest,
    responses(
        (status = 200, description = "Ticket assigned", body = ActionResult<Ticket>),
        (status = 404, description = "Ticket not found", body = ApiError),
        (status = 409, description = "Ticket already finished", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn assign_ticket(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    Json(req): Json<AssignTicketRequest>,
) -> ApiResult<ActionResult<Ticket>> {
    let ticket = state
        .gateway::<Ticket>()
        .assign(auth.principal, id, req.agent_id)
        .await?;
    Ok(ActionResult::ok(ticket))
}

/// POST /api/v1/tickets/:id/start
pub async fn start_ticket(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Ticket>> {
    let ticket = state.gateway::<Ticket>().start(auth.principal, id).await?;
    Ok(ActionResult::ok(ticket))
}

/// POST /api/v1/tickets/:id/resolve
pub async fn resolve_ticket(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<ResolveTicketRequest>>,
) -> ApiResult<ActionResult<Ticket>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let ticket = state
        .gateway::<Ticket>()
        .resolve(auth.principal, id, req.resolution)
        .await?;
    Ok(ActionResult::ok(ticket))
}

/// POST /api/v1/tickets/:id/close
pub async fn close_ticket(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Ticket>> {
    let ticket = state.gateway::<Ticket>().close(auth.principal, id).await?;
    Ok(ActionResult::ok(ticket))
}

/// GET /api/v1/tickets/stats
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/tickets/stats",
    tag = "Tickets",
    params(StatsQuery),
    responses(
        (status = 200, description = "Ticket summary", body = ActionResult<TicketStats>),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn ticket_stats(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(query): Query<StatsQuery>,
) -> ApiResult<ActionResult<TicketStats>> {
    let stats = state
        .gateway::<Ticket>()
        .stats(auth.principal, query.cap_for::<Ticket>())
        .await?;
    Ok(ActionResult::ok(stats))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<Ticket>()
        .route("/stats", get(ticket_stats))
        .route("/:id/assign", post(assign_ticket))
        .route("/:id/start", post(start_ticket))
        .route("/:id/resolve", post(resolve_ticket))
        .route("/:id/close", post(close_ticket))
}
