//! KAZI API - Resource Action Gateway and REST layer
//!
//! `ResourceGateway<R>` gives every business entity (invoices, leads,
//! tickets, approvals, ...) the same owner-scoped CRUD, soft delete,
//! exclusive flags, audited transitions and bounded stats over a
//! `kazi_storage::Datastore`. The Axum routes and middleware in this crate
//! wrap the gateway; they never reach into it.

pub mod auth;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod resource;
pub mod resources;
pub mod routes;
pub mod state;
pub mod stats;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types
pub use auth::{
    authenticate, authenticate_api_key, authenticate_jwt, generate_jwt_token,
    validate_jwt_token, ApiKeyGrant, AuthConfig, AuthContext, AuthMethod, Claims, Permission,
};
pub use config::{ApiConfig, DatastoreKind};
pub use db::{DbConfig, PgDatastore};
pub use envelope::ActionResult;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use gateway::{AuditEntry, ResourceGateway, Transition};
pub use middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use resource::{Cascade, ExclusiveFlag, NoFilter, Ownership, Page, Resource};
pub use routes::create_api_router;
pub use state::AppState;
pub use stats::{Coverage, Window};
