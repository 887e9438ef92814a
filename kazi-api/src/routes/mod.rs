//! REST API Routes Module
//!
//! Every resource is mounted under `/api/v1` with the generic CRUD surface
//! from `generic::crud_routes` plus its own action endpoints. Health checks,
//! metrics and the OpenAPI document live outside `/api/v1` and need no
//! credentials.

pub mod approval;
pub mod bug;
pub mod comment;
pub mod document_version;
pub mod email_alias;
pub mod generic;
pub mod health;
pub mod invoice;
pub mod lead;
pub mod locale;
pub mod milestone;
pub mod social;
pub mod ticket;
pub mod trigger;

pub use generic::{crud_routes, managed_routes, ListResponse, StatsQuery};

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{
    auth_middleware, permission_middleware, rate_limit_middleware, AuthMiddlewareState,
    RateLimitState, API_KEY_HEADER, RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER,
};
use crate::resources::InvoiceItem;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// PRODUCTION VALIDATION
// ============================================================================

fn validate_api_config_for_production(config: &ApiConfig) -> ApiResult<()> {
    if !config.has_cors_allowlist() {
        return Err(ApiError::invalid_input(
            "CORS origins not configured for production. Set KAZI_CORS_ORIGINS.",
        ));
    }
    if !config.rate_limit_enabled {
        tracing::warn!(
            "Rate limiting is disabled in production. \
             Set KAZI_RATE_LIMIT_ENABLED=true to enable it."
        );
    }
    Ok(())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Resource routers, unlayered.
fn entity_routes() -> Router<AppState> {
    Router::new()
        .nest("/invoices", invoice::create_router())
        .nest("/invoice-items", crud_routes::<InvoiceItem>())
        .nest("/invoice-milestones", milestone::create_router())
        .nest("/leads", lead::create_router())
        .nest("/tickets", ticket::create_router())
        .nest("/bugs", bug::create_router())
        .nest("/comments", comment::create_router())
        .nest("/document-versions", document_version::create_router())
        .nest("/locales", locale::create_router())
        .nest("/email-aliases", email_alias::create_router())
        .nest("/triggers", trigger::create_router())
        .nest("/approvals", approval::create_router())
        .nest("/social", social::create_router())
}

/// Build the complete router.
///
/// # Middleware Order (outermost first)
/// 1. CORS - answers preflight before anything else
/// 2. Observability - request log line and HTTP metrics
/// 3. Rate limiting - per principal, else per client IP
/// 4. Auth (only on /api/v1/*) - API key or bearer JWT
/// 5. Permission (only on /api/v1/*) - read for safe methods, write otherwise
///
/// In production the auth and CORS settings are validated first and an
/// unsafe configuration is refused.
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    state.auth_config.validate_for_production()?;
    if state.auth_config.is_production() {
        validate_api_config_for_production(&state.api_config)?;
    }

    let auth_state = AuthMiddlewareState::new(state.auth_config.clone());
    let rate_limit_state =
        RateLimitState::new(state.api_config.clone(), state.auth_config.clone());

    // Layers added later run earlier on the request path.
    let api_routes = entity_routes()
        .layer(from_fn(permission_middleware))
        .layer(from_fn_with_state(auth_state, auth_middleware));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    let cors = build_cors_layer(&state.api_config);
    let timeout = TimeoutLayer::new(state.api_config.request_timeout);

    Ok(router
        .with_state(state)
        .layer(timeout)
        .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
        .layer(from_fn(observability_middleware))
        .layer(cors))
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed (development).
/// Otherwise only the listed origins are.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
            HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.has_cors_allowlist() {
        tracing::info!("CORS: no origins configured, allowing all origins");
        return cors.allow_origin(Any).allow_headers(Any).expose_headers(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if config.cors_allow_credentials {
        cors.allow_origin(origins).allow_credentials(true)
    } else {
        cors.allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use axum::{body::Body, http::Request, http::StatusCode};
    use kazi_storage::InMemoryDatastore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(api_config: ApiConfig, auth_config: AuthConfig) -> AppState {
        AppState::new(
            Arc::new(InMemoryDatastore::new()),
            Arc::new(api_config),
            Arc::new(auth_config),
        )
    }

    #[tokio::test]
    async fn test_health_is_public() -> Result<(), String> {
        let app = create_api_router(state(ApiConfig::default(), AuthConfig::default()))
            .map_err(|e| e.to_string())?;
        let request = Request::builder()
            .uri("/health/live")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app.oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_api_requires_credentials() -> Result<(), String> {
        let app = create_api_router(state(ApiConfig::default(), AuthConfig::default()))
            .map_err(|e| e.to_string())?;
        let request = Request::builder()
            .uri("/api/v1/invoices")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app.oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[test]
    fn test_production_refuses_default_secret() {
        let auth = AuthConfig {
            environment: "production".to_string(),
            ..AuthConfig::default()
        };
        let result = create_api_router(state(ApiConfig::default(), auth));
        assert!(result.is_err());
    }

    #[test]
    fn test_production_requires_cors_allowlist() {
        let config = ApiConfig::default();
        assert!(validate_api_config_for_production(&config).is_err());

        let config = ApiConfig {
            cors_origins: vec!["https://app.kazi.app".to_string()],
            ..ApiConfig::default()
        };
        assert!(validate_api_config_for_production(&config).is_ok());
    }
}
