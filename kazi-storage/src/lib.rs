//! KAZI Storage - Datastore Boundary
//!
//! Defines the relational datastore the gateway talks to: table-scoped
//! selects with chained filters, ordering and range pagination; insert,
//! update, upsert-with-conflict-target and delete; and atomic batches for
//! every multi-write sequence that has to keep an invariant.
//!
//! The Postgres implementation lives in kazi-api next to its connection pool.
//! `InMemoryDatastore` is a complete backend used by tests and local runs.

pub mod datastore;
pub mod memory;
pub mod query;

pub use datastore::Datastore;
pub use memory::{row_matches, InMemoryDatastore};
pub use query::{validate_identifier, Mutation, MutationOutcome, Query};

use kazi_core::StorageError;

/// Result type for datastore operations.
pub type StorageResult<T> = Result<T, StorageError>;
