//! User locale routes. `POST /` accepts `make_default` to create and
//! promote in one call.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::{
    error::ApiResult,
    middleware::AuthExtractor,
    resources::{CreateLocale, Locale},
    state::AppState,
};

use super::generic::managed_routes;

pub async fn add_locale(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(input): Json<CreateLocale>,
) -> ApiResult<(StatusCode, Json<Locale>)> {
    let locale = state.gateway::<Locale>().add_locale(auth.principal, input).await?;
    Ok((StatusCode::CREATED, Json(locale)))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(add_locale))
        .merge(managed_routes::<Locale>())
}
