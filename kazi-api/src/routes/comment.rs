//! Comment routes. Comments attach to any entity through `entity_type`
//! and `entity_id`.

use axum::{extract::State, routing::post, Json, Router};
use kazi_core::EntityId;
use serde::{Deserialize, Serialize};

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::Comment,
    state::AppState,
};

use super::generic::crud_routes;

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReactionRequest {
    pub emoji: String,
}

/// POST /api/v1/comments/:id/reactions
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/comments/{id}/reactions",
    tag = "Comments",
    params(("id" = Uuid, Path, description = "Comment ID")),
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Reaction stored, count incremented", body = ActionResult<Comment>),
        (status = 400, description = "Empty emoji", body = ApiError),
        (status = 404, description = "Comment not found", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn add_reaction(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    Json(req): Json<ReactionRequest>,
) -> ApiResult<ActionResult<Comment>> {
    let comment = state
        .gateway::<Comment>()
        .react(auth.principal, id, &req.emoji)
        .await?;
    Ok(ActionResult::ok(comment))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<Comment>().route("/:id/reactions", post(add_reaction))
}
