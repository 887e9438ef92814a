//! Credential check for every `/api/v1` route.
//!
//! Resolves the caller from `x-api-key` or `Authorization: Bearer` and
//! stores the `AuthContext` on the request. Requests with neither get 401.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{AsHeaderName, AUTHORIZATION},
        request::Parts,
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};

use crate::auth::{authenticate, AuthConfig, AuthContext};
use crate::error::{ApiError, ApiResult};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: Arc<AuthConfig>) -> Self {
        Self { auth_config }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Resolve the caller from headers alone. The rate limiter uses this to key
/// its buckets before the auth layer has run.
pub fn authenticate_headers(config: &AuthConfig, headers: &HeaderMap) -> ApiResult<AuthContext> {
    authenticate(
        config,
        header_str(headers, API_KEY_HEADER),
        header_str(headers, AUTHORIZATION),
    )
}

pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = authenticate_headers(&state.auth_config, request.headers()).map_err(|err| {
        tracing::debug!(path = %request.uri().path(), code = %err.code, "rejected credentials");
        err
    })?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Handler argument carrying the authenticated caller.
///
/// Rejects with 500 on routes mounted outside `auth_middleware`, since that
/// is a wiring bug rather than a client error.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(ctx) => Ok(AuthExtractor(ctx.clone())),
            None => Err(ApiError::internal_error("route is not behind auth_middleware")),
        }
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Caller stored by `auth_middleware`, for layers that run after it.
pub fn extract_auth_context(request: &Request) -> ApiResult<&AuthContext> {
    request
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| ApiError::unauthorized("request carries no caller"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt_token, ApiKeyGrant, JwtSecret, Permission};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use kazi_core::OwnerId;
    use std::collections::HashSet;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn principal() -> OwnerId {
        OwnerId::new(Uuid::from_u128(42))
    }

    fn test_auth_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.add_api_key(
            "test_key_123",
            ApiKeyGrant {
                principal: principal(),
                permissions: HashSet::from([Permission::Read]),
            },
        );
        config.jwt_secret =
            JwtSecret::new("test_secret".to_string()).expect("test secret should be valid");
        config
    }

    async fn whoami(AuthExtractor(auth): AuthExtractor) -> String {
        format!("{}:{:?}", auth.principal, auth.method)
    }

    fn test_app(config: AuthConfig) -> Router {
        let auth_state = AuthMiddlewareState::new(Arc::new(config));
        Router::new()
            .route("/protected", get(whoami))
            .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
    }

    async fn send(app: Router, request: Request<Body>) -> Result<(StatusCode, String), String> {
        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let text = String::from_utf8(body.to_vec()).map_err(|e| e.to_string())?;
        Ok((status, text))
    }

    #[tokio::test]
    async fn test_middleware_with_valid_api_key() -> Result<(), String> {
        let request = Request::builder()
            .uri("/protected")
            .header("x-api-key", "test_key_123")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let (status, body) = send(test_app(test_auth_config()), request).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("{}:ApiKey", principal()));
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_with_invalid_api_key() -> Result<(), String> {
        let request = Request::builder()
            .uri("/protected")
            .header("x-api-key", "invalid_key")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let (status, body) = send(test_app(test_auth_config()), request).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("UNAUTHORIZED"));
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_without_authentication() -> Result<(), String> {
        let request = Request::builder()
            .uri("/protected")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let (status, _) = send(test_app(test_auth_config()), request).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_with_valid_jwt() -> Result<(), String> {
        let config = test_auth_config();
        let token = generate_jwt_token(&config, principal(), [Permission::Write])
            .map_err(|e| e.message)?;

        let request = Request::builder()
            .uri("/protected")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let (status, body) = send(test_app(config), request).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("{}:Jwt", principal()));
        Ok(())
    }

    #[tokio::test]
    async fn test_middleware_with_malformed_auth_header() -> Result<(), String> {
        let request = Request::builder()
            .uri("/protected")
            .header("authorization", "NotBearer token")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let (status, _) = send(test_app(test_auth_config()), request).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_auth_extractor_without_middleware() -> Result<(), String> {
        let app = Router::new().route("/unprotected", get(whoami));
        let request = Request::builder()
            .uri("/unprotected")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;

        let (status, _) = send(app, request).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }
}
