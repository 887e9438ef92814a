//! Bug report routes.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Router,
};
use kazi_core::EntityId;

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::{BugReport, BugStats},
    state::AppState,
};

use super::generic::{crud_routes, StatsQuery};

/// GET /api/v1/bugs/stats
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/bugs/stats",
    tag = "Bugs",
    params(StatsQuery),
    responses(
        (status = 200, description = "Counts by severity and status", body = ActionResult<BugStats>),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn bug_stats(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(query): Query<StatsQuery>,
) -> ApiResult<ActionResult<BugStats>> {
    let stats = state
        .gateway::<BugReport>()
        .stats(auth.principal, query.cap_for::<BugReport>())
        .await?;
    Ok(ActionResult::ok(stats))
}

pub async fn resolve_bug(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<BugReport>> {
    let bug = state.gateway::<BugReport>().resolve(auth.principal, id).await?;
    Ok(ActionResult::ok(bug))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<BugReport>()
        .route("/stats", get(bug_stats))
        .route("/:id/resolve", post(resolve_bug))
}
