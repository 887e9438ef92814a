//! Social graph routes: follows, connections and blocks.
//!
//! The acting user is always the authenticated principal; the other user
//! comes from the body or the path.

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use kazi_core::OwnerId;
use serde::{Deserialize, Serialize};

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::{BlockStatus, UserBlock, UserConnection, UserFollow},
    state::AppState,
};

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TargetUserRequest {
    pub user_id: OwnerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BlockUserRequest {
    pub user_id: OwnerId,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConnectionResponseRequest {
    pub accept: bool,
}

/// Result of an unfollow or unblock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemovedResponse {
    /// False when there was nothing to remove.
    pub removed: bool,
}

// ============================================================================
// BLOCKS
// ============================================================================

/// POST /api/v1/social/blocks
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/social/blocks",
    tag = "Social",
    request_body = BlockUserRequest,
    responses(
        (status = 200, description = "User blocked, follows and connections removed", body = ActionResult<UserBlock>),
        (status = 400, description = "Cannot block yourself", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn block_user(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<BlockUserRequest>,
) -> ApiResult<ActionResult<UserBlock>> {
    let block = state
        .social
        .block_user(auth.principal, req.user_id, req.reason)
        .await?;
    tracing::info!(blocker = %auth.principal, blocked = %req.user_id, "User blocked");
    Ok(ActionResult::ok(block))
}

/// DELETE /api/v1/social/blocks/:user_id
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/v1/social/blocks/{user_id}",
    tag = "Social",
    params(("user_id" = Uuid, Path, description = "Blocked user")),
    responses(
        (status = 200, description = "Block removed if present", body = ActionResult<RemovedResponse>),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn unblock_user(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(target): PathId<OwnerId>,
) -> ApiResult<ActionResult<RemovedResponse>> {
    let removed = state.social.unblock_user(auth.principal, target).await?;
    Ok(ActionResult::ok(RemovedResponse { removed }))
}

/// GET /api/v1/social/blocks/:user_id
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/social/blocks/{user_id}",
    tag = "Social",
    params(("user_id" = Uuid, Path, description = "Other user")),
    responses(
        (status = 200, description = "Block status in either direction", body = ActionResult<BlockStatus>),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn block_status(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(other): PathId<OwnerId>,
) -> ApiResult<ActionResult<BlockStatus>> {
    let status = state.social.is_blocked(auth.principal, other).await?;
    Ok(ActionResult::ok(status))
}

/// GET /api/v1/social/blocks
pub async fn list_blocked(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<ActionResult<Vec<UserBlock>>> {
    let blocks = state.social.list_blocked(auth.principal).await?;
    Ok(ActionResult::ok(blocks))
}

// ============================================================================
// FOLLOWS
// ============================================================================

/// POST /api/v1/social/follows
pub async fn follow(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<TargetUserRequest>,
) -> ApiResult<ActionResult<UserFollow>> {
    let edge = state.social.follow(auth.principal, req.user_id).await?;
    Ok(ActionResult::ok(edge))
}

/// DELETE /api/v1/social/follows/:user_id
pub async fn unfollow(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(target): PathId<OwnerId>,
) -> ApiResult<ActionResult<RemovedResponse>> {
    let removed = state.social.unfollow(auth.principal, target).await?;
    Ok(ActionResult::ok(RemovedResponse { removed }))
}

/// GET /api/v1/social/following
pub async fn following(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<ActionResult<Vec<UserFollow>>> {
    Ok(ActionResult::ok(state.social.following(auth.principal).await?))
}

/// GET /api/v1/social/followers
pub async fn followers(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<ActionResult<Vec<UserFollow>>> {
    Ok(ActionResult::ok(state.social.followers(auth.principal).await?))
}

// ============================================================================
// CONNECTIONS
// ============================================================================

/// POST /api/v1/social/connections
pub async fn connect(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<TargetUserRequest>,
) -> ApiResult<ActionResult<UserConnection>> {
    let connection = state.social.connect(auth.principal, req.user_id).await?;
    Ok(ActionResult::ok(connection))
}

/// POST /api/v1/social/connections/:user_id/respond
pub async fn respond_to_connection(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(requester): PathId<OwnerId>,
    Json(req): Json<ConnectionResponseRequest>,
) -> ApiResult<ActionResult<UserConnection>> {
    let connection = state
        .social
        .respond_to_connection(auth.principal, requester, req.accept)
        .await?;
    Ok(ActionResult::ok(connection))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/blocks", post(block_user).get(list_blocked))
        .route("/blocks/:user_id", get(block_status).delete(unblock_user))
        .route("/follows", post(follow))
        .route("/follows/:user_id", delete(unfollow))
        .route("/following", get(following))
        .route("/followers", get(followers))
        .route("/connections", post(connect))
        .route("/connections/:user_id/respond", post(respond_to_connection))
}
