//! Error types for KAZI operations

use thiserror::Error;

/// Datastore errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Row not found in {table} with id {id}")]
    NotFound { table: String, id: String },

    #[error("Insert failed for {table}: {reason}")]
    InsertFailed { table: String, reason: String },

    #[error("Update failed for {table}: {reason}")]
    UpdateFailed { table: String, reason: String },

    #[error("Delete failed for {table}: {reason}")]
    DeleteFailed { table: String, reason: String },

    #[error("Unique constraint violated on {table} ({columns})")]
    UniqueViolation { table: String, columns: String },

    /// A guarded mutation affected no rows; the surrounding batch was rolled back.
    #[error("No row in {table} matched a required mutation")]
    NoMatch { table: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Invalid identifier: {name}")]
    InvalidIdentifier { name: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Datastore backend error: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Caller-supplied invariant violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Relationship pointing back at its own subject (blocking yourself).
    #[error("{relation} cannot target the acting user")]
    SelfReference { relation: String },

    #[error("Invalid transition for {entity} from {from} to {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all KAZI errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KaziError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for KAZI operations.
pub type KaziResult<T> = Result<T, KaziError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotFound {
            table: "invoices".to_string(),
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Row not found in invoices with id abc");
    }

    #[test]
    fn test_master_error_wraps_sources() {
        let err: KaziError = ValidationError::SelfReference {
            relation: "block".to_string(),
        }
        .into();
        assert!(matches!(err, KaziError::Validation(_)));
        assert!(err.to_string().contains("cannot target the acting user"));

        let err: KaziError = StorageError::LockPoisoned.into();
        assert!(matches!(err, KaziError::Storage(StorageError::LockPoisoned)));
    }
}
