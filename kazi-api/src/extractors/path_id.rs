//! Path extractor for UUID identifiers.
//!
//! `PathId<T>` parses the single path parameter as a UUID and converts it
//! into `T` (`EntityId`, `OwnerId`, ...). A malformed id is a 400 with the
//! regular `ApiError` body instead of axum's plain-text rejection.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct PathId<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathId<T>
where
    S: Send + Sync,
    T: From<Uuid>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(uuid): Path<Uuid> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                ApiError::invalid_format("id", "UUID").with_details(serde_json::json!({
                    "path": parts.uri.path(),
                    "reason": e.to_string(),
                }))
            })?;
        Ok(PathId(T::from(uuid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}, routing::get, Router};
    use kazi_core::OwnerId;
    use tower::ServiceExt;

    async fn echo(PathId(owner): PathId<OwnerId>) -> String {
        owner.to_string()
    }

    #[tokio::test]
    async fn test_path_id_parses_uuid() -> Result<(), String> {
        let app = Router::new().route("/users/:id", get(echo));
        let id = Uuid::now_v7();
        let request = Request::builder()
            .uri(format!("/users/{}", id))
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app.oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_path_id_rejects_garbage() -> Result<(), String> {
        let app = Router::new().route("/users/:id", get(echo));
        let request = Request::builder()
            .uri("/users/not-a-uuid")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app.oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        let json: serde_json::Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(json["code"], "INVALID_FORMAT");
        Ok(())
    }
}
