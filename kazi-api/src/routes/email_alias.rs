//! Email alias routes. `POST /:id/default` makes an alias primary.

use axum::{extract::State, routing::post, Router};
use kazi_core::EntityId;

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::EmailAlias,
    state::AppState,
};

use super::generic::crud_routes;

pub async fn verify_alias(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<EmailAlias>> {
    let alias = state
        .gateway::<EmailAlias>()
        .mark_verified(auth.principal, id)
        .await?;
    Ok(ActionResult::ok(alias))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<EmailAlias>().route("/:id/verify", post(verify_alias))
}
