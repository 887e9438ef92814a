//! Permission check by HTTP method.
//!
//! Runs inside `auth_middleware`. Safe methods need `read`, everything else
//! needs `write`; `admin` satisfies both.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::auth::Permission;
use crate::error::ApiError;

use super::auth::extract_auth_context;

pub async fn permission_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let required = Permission::required_for(request.method());
    let auth = extract_auth_context(&request)?;

    if let Err(e) = auth.require(required) {
        tracing::warn!(
            principal = %auth.principal,
            method = %request.method(),
            path = %request.uri().path(),
            required = %required,
            "Permission denied"
        );
        return Err(e);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthContext, AuthMethod};
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use kazi_core::OwnerId;
    use tower::ServiceExt;

    fn app_with(permissions: Vec<Permission>) -> Router {
        let ctx = AuthContext::new(OwnerId::generate(), permissions, AuthMethod::ApiKey);
        Router::new()
            .route("/things", get(|| async { "list" }).post(|| async { "created" }))
            .layer(middleware::from_fn(permission_middleware))
            .layer(middleware::from_fn(move |mut req: Request<Body>, next: Next| {
                let ctx = ctx.clone();
                async move {
                    req.extensions_mut().insert(ctx);
                    next.run(req).await
                }
            }))
    }

    async fn status_of(app: Router, method: Method) -> Result<StatusCode, String> {
        let request = Request::builder()
            .method(method)
            .uri("/things")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app.oneshot(request).await.map_err(|e| format!("{:?}", e))?;
        Ok(response.status())
    }

    #[tokio::test]
    async fn test_read_permission_allows_get_only() -> Result<(), String> {
        let app = app_with(vec![Permission::Read]);
        assert_eq!(status_of(app.clone(), Method::GET).await?, StatusCode::OK);
        assert_eq!(status_of(app, Method::POST).await?, StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_without_read_cannot_list() -> Result<(), String> {
        let app = app_with(vec![Permission::Write]);
        assert_eq!(status_of(app.clone(), Method::POST).await?, StatusCode::OK);
        assert_eq!(status_of(app, Method::GET).await?, StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_allows_everything() -> Result<(), String> {
        let app = app_with(vec![Permission::Admin]);
        assert_eq!(status_of(app.clone(), Method::GET).await?, StatusCode::OK);
        assert_eq!(status_of(app, Method::POST).await?, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_context_is_unauthorized() -> Result<(), String> {
        let app = Router::new()
            .route("/things", get(|| async { "list" }))
            .layer(middleware::from_fn(permission_middleware));
        assert_eq!(status_of(app, Method::GET).await?, StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
