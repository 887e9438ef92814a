//! Automation trigger routes.

use axum::{extract::State, routing::post, Json, Router};
use kazi_core::EntityId;

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::{AutomationTrigger, ExecutionReport},
    state::AppState,
};

use super::generic::crud_routes;

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

/// POST /api/v1/triggers/:id/activate
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/triggers/{id}/activate",
    tag = "Triggers",
    params(("id" = Uuid, Path, description = "Trigger ID")),
    responses(
        (status = 200, description = "Trigger active", body = ActionResult<AutomationTrigger>),
        (status = 409, description = "Trigger archived", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn activate_trigger(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<AutomationTrigger>> {
    let trigger = state
        .gateway::<AutomationTrigger>()
        .activate(auth.principal, id)
        .await?;
    Ok(ActionResult::ok(trigger))
}

/// POST /api/v1/triggers/:id/pause
pub async fn pause_trigger(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<AutomationTrigger>> {
    let trigger = state
        .gateway::<AutomationTrigger>()
        .pause(auth.principal, id)
        .await?;
    Ok(ActionResult::ok(trigger))
}

/// POST /api/v1/triggers/:id/archive
pub async fn archive_trigger(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<AutomationTrigger>> {
    let trigger = state
        .gateway::<AutomationTrigger>()
        .archive(auth.principal, id)
        .await?;
    Ok(ActionResult::ok(trigger))
}

/// POST /api/v1/triggers/:id/executions
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/triggers/{id}/executions",
    tag = "Triggers",
    params(("id" = Uuid, Path, description = "Trigger ID")),
    request_body = ExecutionReport,
    responses(
        (status = 200, description = "Execution logged, counters updated", body = ActionResult<AutomationTrigger>),
        (status = 409, description = "Trigger not active", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn record_execution(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    Json(report): Json<ExecutionReport>,
) -> ApiResult<ActionResult<AutomationTrigger>> {
    let trigger = state
        .gateway::<AutomationTrigger>()
        .record_execution(auth.principal, id, report)
        .await?;
    Ok(ActionResult::ok(trigger))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<AutomationTrigger>()
        .route("/:id/activate", post(activate_trigger))
        .route("/:id/pause", post(pause_trigger))
        .route("/:id/archive", post(archive_trigger))
        .route("/:id/executions", post(record_execution))
}
