//! Generic CRUD route handlers for `Resource` types.
//!
//! Every resource gets the same REST surface from `crud_routes::<R>()`;
//! entity modules add their transition endpoints on top:
//!
//! ```ignore
//! pub fn create_router() -> Router<AppState> {
//!     crud_routes::<Lead>()
//!         .route("/:id/assign", post(assign_lead))
//! }
//! ```

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use kazi_core::EntityId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resource::{Page, Resource},
    state::AppState,
};

// ============================================================================
// RESPONSE / QUERY TYPES
// ============================================================================

/// List page plus the owner's total for the same filter.
///
/// Counting stops at `MAX_PAGE_SIZE` rows. Past that `total` is the cap and
/// `total_truncated` is set, so clients must not page by `total` alone.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub total_truncated: bool,
}

/// `?cap=` for stats endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct StatsQuery {
    pub cap: Option<usize>,
}

impl StatsQuery {
    pub fn cap_for<R: Resource>(&self) -> usize {
        self.cap.unwrap_or(R::DEFAULT_LIMIT)
    }
}

// ============================================================================
// GENERIC ROUTE FACTORY
// ============================================================================

/// Standard CRUD routes for a resource.
///
/// - `POST /` create, 201
/// - `GET /` list with filter and `limit`/`offset`
/// - `GET /:id`
/// - `PATCH /:id`
/// - `DELETE /:id` soft when the resource supports it, else hard; 204
/// - `DELETE /:id/purge` hard delete; 204
/// - `POST /:id/restore`
/// - `POST /:id/default` set the exclusive flag
pub fn crud_routes<R>() -> Router<AppState>
where
    R: Resource,
    R::Create: DeserializeOwned,
    R::Update: DeserializeOwned,
    R::Filter: DeserializeOwned,
{
    Router::new()
        .route("/", post(create_route::<R>))
        .merge(managed_routes::<R>())
}

/// Everything in `crud_routes` except `POST /`, for resources whose
/// creation goes through a domain method instead.
pub fn managed_routes<R>() -> Router<AppState>
where
    R: Resource,
    R::Update: DeserializeOwned,
    R::Filter: DeserializeOwned,
{
    Router::new()
        .route("/", get(list_route::<R>))
        .route(
            "/:id",
            get(get_route::<R>)
                .patch(update_route::<R>)
                .delete(delete_route::<R>),
        )
        .route("/:id/purge", delete(purge_route::<R>))
        .route("/:id/restore", post(restore_route::<R>))
        .route("/:id/default", post(set_default_route::<R>))
}

async fn create_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(input): Json<R::Create>,
) -> ApiResult<impl IntoResponse>
where
    R: Resource,
{
    let created = state.gateway::<R>().create(auth.principal, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(filter): Query<R::Filter>,
    Query(page): Query<Page>,
) -> ApiResult<Json<ListResponse<R>>>
where
    R: Resource,
{
    let gateway = state.gateway::<R>();
    let items = gateway.get_many(auth.principal, &filter, page).await?;
    let counted = gateway.count_capped(auth.principal, &filter).await?;
    Ok(Json(ListResponse {
        items,
        total: counted.sample_size as u64,
        total_truncated: counted.truncated,
    }))
}

async fn get_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<Json<R>>
where
    R: Resource,
{
    state
        .gateway::<R>()
        .get_one(auth.principal, id)
        .await?
        .map(Json)
        .ok_or_else(|| R::not_found(id))
}

async fn update_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    Json(input): Json<R::Update>,
) -> ApiResult<Json<R>>
where
    R: Resource,
{
    Ok(Json(state.gateway::<R>().update(auth.principal, id, input).await?))
}

async fn delete_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<StatusCode>
where
    R: Resource,
{
    let gateway = state.gateway::<R>();
    if R::SOFT_DELETE {
        gateway.soft_delete(auth.principal, id).await?;
    } else {
        gateway.hard_delete(auth.principal, id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn purge_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<StatusCode>
where
    R: Resource,
{
    state.gateway::<R>().hard_delete(auth.principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restore_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<Json<R>>
where
    R: Resource,
{
    Ok(Json(state.gateway::<R>().restore(auth.principal, id).await?))
}

async fn set_default_route<R>(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<Json<R>>
where
    R: Resource,
{
    Ok(Json(state.gateway::<R>().set_exclusive(auth.principal, id).await?))
}
