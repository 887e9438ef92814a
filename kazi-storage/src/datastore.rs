//! The datastore boundary.

use ::async_trait::async_trait;
use kazi_core::{FilterExpr, HealthCheck, Record, StorageError};

use crate::{Mutation, MutationOutcome, Query, StorageResult};

/// Relational datastore used by the gateway.
///
/// Backends implement `select`, `execute` and `health`; the single-statement
/// helpers are thin wrappers over a one-element batch. Anything that must keep
/// an invariant across several writes goes through `execute`, which applies
/// the whole batch or nothing.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Short backend name for logs and metrics.
    fn backend(&self) -> &'static str;

    /// Rows matching the query, in query order. Never fails on an empty result.
    async fn select(&self, query: &Query) -> StorageResult<Vec<Record>>;

    /// Apply every mutation atomically, returning one outcome per mutation.
    async fn execute(&self, batch: Vec<Mutation>) -> StorageResult<Vec<MutationOutcome>>;

    /// Liveness of the underlying store.
    async fn health(&self) -> HealthCheck;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Record) -> StorageResult<Record> {
        let outcome = self.execute_one(Mutation::insert(table, row)).await?;
        outcome.first().ok_or_else(|| StorageError::InsertFailed {
            table: table.to_string(),
            reason: "no row returned".to_string(),
        })
    }

    /// Update every matching row, returning the rows after the update.
    async fn update(
        &self,
        table: &str,
        filters: &[FilterExpr],
        patch: Record,
    ) -> StorageResult<Vec<Record>> {
        let outcome = self
            .execute_one(Mutation::update(table, filters.to_vec(), patch))
            .await?;
        Ok(outcome.rows)
    }

    /// Insert or update on the conflict target and return the resulting row.
    async fn upsert(
        &self,
        table: &str,
        row: Record,
        conflict_target: &[&str],
    ) -> StorageResult<Record> {
        let mutation = Mutation::upsert(table, row, conflict_target.iter().copied());
        let outcome = self.execute_one(mutation).await?;
        outcome.first().ok_or_else(|| StorageError::InsertFailed {
            table: table.to_string(),
            reason: "upsert returned no row".to_string(),
        })
    }

    /// Delete every matching row, returning how many were removed.
    async fn delete(&self, table: &str, filters: &[FilterExpr]) -> StorageResult<u64> {
        let outcome = self
            .execute_one(Mutation::delete(table, filters.to_vec()))
            .await?;
        Ok(outcome.affected)
    }

    #[doc(hidden)]
    async fn execute_one(&self, mutation: Mutation) -> StorageResult<MutationOutcome> {
        let mut outcomes = self.execute(vec![mutation]).await?;
        outcomes.pop().ok_or_else(|| StorageError::TransactionFailed {
            reason: "batch returned no outcome".to_string(),
        })
    }
}
