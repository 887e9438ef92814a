//! Invoice REST routes: CRUD plus lifecycle actions and stats.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use kazi_core::{EntityId, EscrowFees, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::{
    envelope::ActionResult,
    error::ApiResult,
    extractors::PathId,
    middleware::AuthExtractor,
    resources::{Invoice, InvoiceStats},
    state::AppState,
};

use super::generic::{crud_routes, StatsQuery};

#[cfg(feature = "openapi")]
use {crate::error::ApiError, uuid::Uuid};

/// Body of `POST /invoices/:id/release`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReleaseFundsRequest {
    pub password: Option<String>,
}

/// POST /api/v1/invoices/:id/release - Release escrowed funds
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/release",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = ReleaseFundsRequest,
    responses(
        (status = 200, description = "Funds released, invoice completed", body = ActionResult<Invoice>),
        (status = 400, description = "Missing or wrong completion password", body = ApiError),
        (status = 404, description = "Invoice not found", body = ApiError),
        (status = 409, description = "Invoice already completed or cancelled", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn release_funds(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    body: Option<Json<ReleaseFundsRequest>>,
) -> ApiResult<ActionResult<Invoice>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let invoice = state
        .gateway::<Invoice>()
        .release_funds(auth.principal, id, req.password.as_deref())
        .await?;
    Ok(ActionResult::ok(invoice))
}

/// POST /api/v1/invoices/:id/send
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/send",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice sent", body = ActionResult<Invoice>),
        (status = 409, description = "Invalid transition", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn send_invoice(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Invoice>> {
    let invoice = state.gateway::<Invoice>().send(auth.principal, id).await?;
    Ok(ActionResult::ok(invoice))
}

/// POST /api/v1/invoices/:id/pay
pub async fn mark_paid(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Invoice>> {
    let invoice = state.gateway::<Invoice>().mark_paid(auth.principal, id).await?;
    Ok(ActionResult::ok(invoice))
}

/// POST /api/v1/invoices/:id/cancel
pub async fn cancel_invoice(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
) -> ApiResult<ActionResult<Invoice>> {
    let invoice = state.gateway::<Invoice>().cancel(auth.principal, id).await?;
    Ok(ActionResult::ok(invoice))
}

/// `?payment_method=` for the fee quote. Card processing when absent.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct FeeQuery {
    pub payment_method: Option<PaymentMethod>,
}

/// GET /api/v1/invoices/:id/fees - Escrow fee breakdown
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/fees",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice ID"), FeeQuery),
    responses(
        (status = 200, description = "Platform, processing and withdrawal fees", body = ActionResult<EscrowFees>),
        (status = 404, description = "Invoice not found", body = ApiError),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn invoice_fees(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    PathId(id): PathId<EntityId>,
    Query(query): Query<FeeQuery>,
) -> ApiResult<ActionResult<EscrowFees>> {
    let fees = state
        .gateway::<Invoice>()
        .fee_quote(auth.principal, id, query.payment_method.unwrap_or_default())
        .await?;
    Ok(ActionResult::ok(fees))
}

/// GET /api/v1/invoices/stats
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/invoices/stats",
    tag = "Invoices",
    params(StatsQuery),
    responses(
        (status = 200, description = "Invoice summary", body = ActionResult<InvoiceStats>),
    ),
    security(("api_key" = []), ("bearer_auth" = []))
))]
pub async fn invoice_stats(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(query): Query<StatsQuery>,
) -> ApiResult<ActionResult<InvoiceStats>> {
    let stats = state
        .gateway::<Invoice>()
        .stats(auth.principal, query.cap_for::<Invoice>())
        .await?;
    Ok(ActionResult::ok(stats))
}

pub fn create_router() -> Router<AppState> {
    crud_routes::<Invoice>()
        .route("/stats", get(invoice_stats))
        .route("/:id/fees", get(invoice_fees))
        .route("/:id/release", post(release_funds))
        .route("/:id/send", post(send_invoice))
        .route("/:id/pay", post(mark_paid))
        .route("/:id/cancel", post(cancel_invoice))
}
