//! Gateway and HTTP errors.
//!
//! Every gateway call returns `ApiResult<T>`. The four failure families a
//! caller can see map onto `ErrorCode`s:
//!
//! | family            | codes                                                  | status |
//! |-------------------|--------------------------------------------------------|--------|
//! | not found         | `ENTITY_NOT_FOUND`                                     | 404    |
//! | validation        | `VALIDATION_FAILED`, `INVALID_INPUT`, `MISSING_FIELD`, `INVALID_FORMAT` | 400 |
//! | conflict          | `ENTITY_ALREADY_EXISTS`, `STATE_CONFLICT`              | 409    |
//! | datastore failure | `DATABASE_ERROR`, `CONNECTION_POOL_EXHAUSTED`, `SERVICE_UNAVAILABLE`, `INTERNAL_ERROR` | 5xx |
//!
//! plus the auth and throttling codes raised by middleware. Datastore
//! faults are logged here and reach the client as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kazi_core::{ConfigError, KaziError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQLSTATE raised by Postgres on a unique constraint violation.
const PG_UNIQUE_VIOLATION: &str = "23505";

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Machine-readable error code, serialized as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Credentials and permissions
    /// No usable API key or bearer token
    Unauthorized,
    /// Principal lacks the permission the route needs, or a social block applies
    Forbidden,
    InvalidToken,
    TokenExpired,

    // Validation
    /// Caller-supplied invariant violated
    ValidationFailed,
    InvalidInput,
    MissingField,
    InvalidFormat,

    // Not found
    /// Row does not exist or is not owned by the caller
    EntityNotFound,

    // Conflict
    /// Unique scope already taken
    EntityAlreadyExists,
    /// Transition not allowed from the row's current status
    StateConflict,

    // Datastore failure
    InternalError,
    DatabaseError,
    ServiceUnavailable,
    ConnectionPoolExhausted,

    // Throttling
    TooManyRequests,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::EntityAlreadyExists | ErrorCode::StateConflict => StatusCode::CONFLICT,
            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message used when a code is raised without one.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Credentials required",
            ErrorCode::Forbidden => "Not permitted",
            ErrorCode::InvalidToken => "Bearer token is invalid",
            ErrorCode::TokenExpired => "Bearer token has expired",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidInput => "Input could not be read",
            ErrorCode::MissingField => "A required field is missing",
            ErrorCode::InvalidFormat => "A field is malformed",
            ErrorCode::EntityNotFound => "Not found",
            ErrorCode::EntityAlreadyExists => "Already exists",
            ErrorCode::StateConflict => "Not allowed in the current status",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::DatabaseError => "Datastore operation failed",
            ErrorCode::ServiceUnavailable => "Datastore unavailable",
            ErrorCode::ConnectionPoolExhausted => "No datastore connection available",
            ErrorCode::TooManyRequests => "Too many requests",
        }
    }

    /// True for the datastore-failure family (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Error returned by the gateway and rendered as the JSON body of a failed
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Structured context such as the conflicting columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingField, format!("{} is required", field))
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("{} must be {}", field, expected),
        )
    }

    /// `<table> <id> not found`, used for owner-scoped lookups.
    pub fn entity_not_found(table: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::EntityNotFound, format!("{} {} not found", table, id))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    pub fn entity_already_exists(entity: &str, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityAlreadyExists,
            format!("{} already exists: {}", entity, detail),
        )
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        match retry_after_secs {
            Some(secs) => Self::new(
                ErrorCode::TooManyRequests,
                format!("Too many requests, retry in {}s", secs),
            ),
            None => Self::from_code(ErrorCode::TooManyRequests),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { table, id } => ApiError::entity_not_found(&table, id),
            StorageError::NoMatch { table } => {
                ApiError::not_found(format!("No matching row in {}", table))
            }
            StorageError::UniqueViolation { table, columns } => {
                ApiError::entity_already_exists(&table, format!("({}) is taken", columns))
                    .with_details(serde_json::json!({ "columns": columns }))
            }
            StorageError::InvalidIdentifier { name } => {
                ApiError::invalid_input(format!("Invalid identifier: {}", name))
            }
            other => {
                tracing::error!(error = %other, "datastore call failed");
                ApiError::from_code(ErrorCode::DatabaseError)
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(&field),
            ValidationError::InvalidTransition { .. } => ApiError::state_conflict(err.to_string()),
            ValidationError::InvalidValue { .. }
            | ValidationError::SelfReference { .. }
            | ValidationError::ConstraintViolation { .. } => {
                ApiError::validation_failed(err.to_string())
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::invalid_input(err.to_string())
    }
}

impl From<KaziError> for ApiError {
    fn from(err: KaziError) -> Self {
        match err {
            KaziError::Storage(e) => e.into(),
            KaziError::Validation(e) => e.into(),
            KaziError::Config(e) => e.into(),
        }
    }
}

// ============================================================================
// CONVERSIONS FROM DRIVER ERRORS
// ============================================================================

// Driver faults are logged in full and surface as a generic datastore failure.

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.code() {
            Some(state) if state.code() == PG_UNIQUE_VIOLATION => {
                ApiError::entity_already_exists("row", "unique constraint violated")
            }
            _ => {
                tracing::error!(error = ?err, "postgres query failed");
                ApiError::from_code(ErrorCode::DatabaseError)
            }
        }
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        use deadpool_postgres::PoolError;

        tracing::error!(error = ?err, "postgres pool checkout failed");
        match err {
            PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            PoolError::Closed => ApiError::service_unavailable("datastore pool is closed"),
            _ => ApiError::from_code(ErrorCode::DatabaseError),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("bad JSON: {}", err))
    }
}

impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("id", &format!("a UUID ({})", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
