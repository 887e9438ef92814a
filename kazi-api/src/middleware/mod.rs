//! Middleware modules for the KAZI API
//!
//! - `auth`: credential check, injects `AuthContext`
//! - `permission`: read/write/admin by HTTP method
//! - `rate_limit`: per-principal or per-IP token buckets
//!
//! # Middleware Order
//!
//! Outermost first: request logging, rate limit, auth, permission.
//!
//! ```ignore
//! Router::new()
//!     .route("/api/v1/invoices", get(list))
//!     // Innermost (runs last on request, first on response)
//!     .layer(middleware::from_fn(permission_middleware))
//!     .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//!     .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(middleware::from_fn(observability_middleware))
//!     // Outermost
//! ```

mod auth;
mod permission;
mod rate_limit;

pub use auth::{
    auth_middleware, authenticate_headers, extract_auth_context, AuthExtractor,
    AuthMiddlewareState, API_KEY_HEADER,
};
pub use permission::permission_middleware;
pub use rate_limit::{
    rate_limit_middleware, RateLimitError, RateLimitKey, RateLimitState,
    RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER,
};
