//! Health Check Endpoints
//!
//! Kubernetes-style probes, no authentication:
//! - /health/live - process is up
//! - /health/ready - datastore answers a ping

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use kazi_core::{HealthCheck, HealthStatus};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    pub datastore: HealthCheck,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health/live
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
))]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Datastore reachable", body = HealthResponse),
        (status = 503, description = "Datastore unreachable", body = HealthResponse),
    ),
))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let datastore = state.store.health().await;
    let status = datastore.status;
    if status != HealthStatus::Healthy {
        tracing::warn!(
            backend = state.store.backend(),
            message = datastore.message.as_deref().unwrap_or(""),
            "Readiness check failed"
        );
    }

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            datastore,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (status_code, Json(response))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::config::ApiConfig;
    use axum::{body::Body, http::Request};
    use kazi_storage::InMemoryDatastore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let state = AppState::new(
            Arc::new(InMemoryDatastore::new()),
            Arc::new(ApiConfig::default()),
            Arc::new(AuthConfig::default()),
        );
        create_router().with_state(state)
    }

    #[tokio::test]
    async fn test_ready_reports_datastore() -> Result<(), String> {
        let request = Request::builder()
            .uri("/ready")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app().oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let json: serde_json::Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["details"]["datastore"]["metadata"]["backend"], "memory");
        Ok(())
    }

    #[tokio::test]
    async fn test_live() -> Result<(), String> {
        let request = Request::builder()
            .uri("/live")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app().oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
