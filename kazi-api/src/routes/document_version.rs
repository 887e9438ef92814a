//! Document version routes.
//!
//! Creating a version publishes it: it gets the next version number for
//! its target and becomes the target's current version.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use kazi_core::EntityRef;

use crate::{
    envelope::ActionResult,
    error::{ApiError, ApiResult},
    middleware::AuthExtractor,
    resources::{CreateDocumentVersion, DocumentVersion},
    state::AppState,
};

use super::generic::managed_routes;

pub async fn publish_version(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(input): Json<CreateDocumentVersion>,
) -> ApiResult<(StatusCode, Json<DocumentVersion>)> {
    let version = state
        .gateway::<DocumentVersion>()
        .publish(auth.principal, input)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

/// GET /api/v1/document-versions/current?entity_type=..&entity_id=..
pub async fn current_version(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(target): Query<EntityRef>,
) -> ApiResult<ActionResult<DocumentVersion>> {
    state
        .gateway::<DocumentVersion>()
        .current(auth.principal, target)
        .await?
        .map(ActionResult::ok)
        .ok_or_else(|| ApiError::not_found(format!("no current version for {}", target)))
}

/// GET /api/v1/document-versions/history?entity_type=..&entity_id=..
pub async fn version_history(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(target): Query<EntityRef>,
) -> ApiResult<ActionResult<Vec<DocumentVersion>>> {
    let versions = state
        .gateway::<DocumentVersion>()
        .history(auth.principal, target)
        .await?;
    Ok(ActionResult::ok(versions))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(publish_version))
        .route("/current", get(current_version))
        .route("/history", get(version_history))
        .merge(managed_routes::<DocumentVersion>())
}
