//! In-memory datastore.
//!
//! Tables are `Vec<Record>` behind one `tokio::sync::RwLock`. A batch runs
//! against a cloned snapshot under the write lock and replaces the live tables
//! only when every mutation succeeded, which gives the same all-or-nothing
//! behavior as a database transaction.

use ::async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use kazi_core::{
    FilterExpr, FilterOperator, HealthCheck, Record, SortDirection, StorageError,
    CREATED_AT_COLUMN, ID_COLUMN,
};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{Datastore, Mutation, MutationOutcome, Query, StorageResult};

type Tables = HashMap<String, Vec<Record>>;
type UniqueKeys = HashMap<String, Vec<Vec<String>>>;

/// Datastore keeping every table in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatastore {
    tables: Arc<RwLock<Tables>>,
    unique_keys: Arc<UniqueKeys>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unique key. Rows whose key columns are all non-null must be
    /// distinct on those columns.
    pub fn with_unique(mut self, table: &str, columns: &[&str]) -> Self {
        Arc::make_mut(&mut self.unique_keys)
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Number of rows currently stored in `table`.
    pub async fn row_count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, Vec::len)
    }

    /// Copy of every row in `table`, in insertion order.
    pub async fn dump(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop all stored rows. Unique keys are kept.
    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn select(&self, query: &Query) -> StorageResult<Vec<Record>> {
        query.validate()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Record> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, direction)) = &query.order {
            order_rows(&mut rows, column, *direction);
        }

        Ok(rows
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn execute(&self, batch: Vec<Mutation>) -> StorageResult<Vec<MutationOutcome>> {
        for mutation in &batch {
            mutation.validate()?;
        }

        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        let mut outcomes = Vec::with_capacity(batch.len());
        for mutation in batch {
            outcomes.push(apply_mutation(&mut staged, &self.unique_keys, mutation)?);
        }
        *tables = staged;
        Ok(outcomes)
    }

    async fn health(&self) -> HealthCheck {
        let tables = self.tables.read().await.len();
        HealthCheck::healthy("datastore")
            .with_metadata("backend", json!("memory"))
            .with_metadata("tables", json!(tables))
    }
}

// ============================================================================
// MUTATIONS
// ============================================================================

fn apply_mutation(
    tables: &mut Tables,
    unique_keys: &UniqueKeys,
    mutation: Mutation,
) -> StorageResult<MutationOutcome> {
    match mutation {
        Mutation::Insert { table, row } => {
            let rows = tables.entry(table.clone()).or_default();
            insert_row(&table, rows, unique_keys, row)
        }
        Mutation::Update {
            table,
            filters,
            patch,
            require_match,
        } => {
            let rows = tables.entry(table.clone()).or_default();
            let indices = matching_indices(rows, &filters);
            if indices.is_empty() && require_match {
                return Err(StorageError::NoMatch { table });
            }

            let mut updated = Vec::with_capacity(indices.len());
            for idx in indices {
                let mut next = rows[idx].clone();
                for (column, value) in &patch {
                    next.insert(column.clone(), value.clone());
                }
                check_unique(&table, unique_keys, rows, &next, Some(idx))?;
                rows[idx] = next.clone();
                updated.push(next);
            }
            Ok(MutationOutcome::rows(updated))
        }
        Mutation::Upsert {
            table,
            row,
            conflict_target,
        } => {
            let rows = tables.entry(table.clone()).or_default();
            let existing = rows.iter().position(|stored| {
                conflict_target.iter().all(|column| {
                    match (stored.get(column), row.get(column)) {
                        (Some(a), Some(b)) if !b.is_null() => values_equal(a, b),
                        _ => false,
                    }
                })
            });

            let Some(idx) = existing else {
                return insert_row(&table, rows, unique_keys, row);
            };

            let mut next = rows[idx].clone();
            for (column, value) in row {
                if column == ID_COLUMN
                    || column == CREATED_AT_COLUMN
                    || conflict_target.contains(&column)
                {
                    continue;
                }
                next.insert(column, value);
            }
            check_unique(&table, unique_keys, rows, &next, Some(idx))?;
            rows[idx] = next.clone();
            Ok(MutationOutcome::rows(vec![next]))
        }
        Mutation::Delete {
            table,
            filters,
            require_match,
        } => {
            let rows = tables.entry(table.clone()).or_default();
            let before = rows.len();
            rows.retain(|row| !row_matches(row, &filters));
            let removed = (before - rows.len()) as u64;
            if removed == 0 && require_match {
                return Err(StorageError::NoMatch { table });
            }
            Ok(MutationOutcome::deleted(removed))
        }
        Mutation::Increment {
            table,
            filters,
            field,
            by,
            require_match,
        } => {
            let rows = tables.entry(table.clone()).or_default();
            let indices = matching_indices(rows, &filters);
            if indices.is_empty() && require_match {
                return Err(StorageError::NoMatch { table });
            }

            let mut updated = Vec::with_capacity(indices.len());
            for idx in indices {
                let next_value = match rows[idx].get(&field) {
                    None | Some(Value::Null) => json!(by),
                    Some(Value::Number(n)) => match n.as_i64() {
                        Some(current) => json!(current.saturating_add(by)),
                        None => json!(n.as_f64().unwrap_or_default() + by as f64),
                    },
                    Some(_) => {
                        return Err(StorageError::UpdateFailed {
                            table,
                            reason: format!("cannot increment non-numeric column {}", field),
                        })
                    }
                };
                rows[idx].insert(field.clone(), next_value);
                updated.push(rows[idx].clone());
            }
            Ok(MutationOutcome::rows(updated))
        }
    }
}

fn insert_row(
    table: &str,
    rows: &mut Vec<Record>,
    unique_keys: &UniqueKeys,
    row: Record,
) -> StorageResult<MutationOutcome> {
    if let Some(id) = row.get(ID_COLUMN).filter(|v| !v.is_null()) {
        if rows.iter().any(|stored| stored.get(ID_COLUMN) == Some(id)) {
            return Err(StorageError::InsertFailed {
                table: table.to_string(),
                reason: format!("row with id {} already exists", id),
            });
        }
    }
    check_unique(table, unique_keys, rows, &row, None)?;
    rows.push(row.clone());
    Ok(MutationOutcome::rows(vec![row]))
}

fn check_unique(
    table: &str,
    unique_keys: &UniqueKeys,
    rows: &[Record],
    candidate: &Record,
    skip: Option<usize>,
) -> StorageResult<()> {
    for key in unique_keys.get(table).into_iter().flatten() {
        let values: Option<Vec<&Value>> = key
            .iter()
            .map(|column| candidate.get(column).filter(|v| !v.is_null()))
            .collect();
        let Some(values) = values else {
            continue;
        };

        let clash = rows.iter().enumerate().any(|(idx, row)| {
            Some(idx) != skip
                && key
                    .iter()
                    .zip(&values)
                    .all(|(column, value)| row.get(column).is_some_and(|v| values_equal(v, value)))
        });
        if clash {
            return Err(StorageError::UniqueViolation {
                table: table.to_string(),
                columns: key.join(", "),
            });
        }
    }
    Ok(())
}

fn matching_indices(rows: &[Record], filters: &[FilterExpr]) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row_matches(row, filters))
        .map(|(idx, _)| idx)
        .collect()
}

// ============================================================================
// FILTER EVALUATION
// ============================================================================

/// Whether `row` satisfies every filter, with SQL null semantics: a null
/// column only ever matches `IsNull`.
pub fn row_matches(row: &Record, filters: &[FilterExpr]) -> bool {
    filters.iter().all(|filter| filter_matches(row, filter))
}

fn filter_matches(row: &Record, filter: &FilterExpr) -> bool {
    let field = row.get(&filter.field).unwrap_or(&Value::Null);
    match filter.operator {
        FilterOperator::IsNull => field.is_null(),
        FilterOperator::NotNull => !field.is_null(),
        _ if field.is_null() => false,
        FilterOperator::Eq => values_equal(field, &filter.value),
        FilterOperator::Ne => !values_equal(field, &filter.value),
        FilterOperator::Gt => compare_values(field, &filter.value) == Some(Ordering::Greater),
        FilterOperator::Gte => matches!(
            compare_values(field, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::Lt => compare_values(field, &filter.value) == Some(Ordering::Less),
        FilterOperator::Lte => matches!(
            compare_values(field, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::Contains => contains(field, &filter.value),
        FilterOperator::ILike => match (field.as_str(), filter.value.as_str()) {
            (Some(text), Some(pattern)) => ilike(text, pattern),
            _ => false,
        },
        FilterOperator::In => filter
            .value
            .as_array()
            .is_some_and(|values| values.iter().any(|v| values_equal(field, v))),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => {
            x == y
                || matches!(
                    (parse_timestamp(x), parse_timestamp(y)),
                    (Some(p), Some(q)) if p == q
                )
        }
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(p), Some(q)) => Some(p.cmp(&q)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Array(items), Value::Array(needles)) => needles
            .iter()
            .all(|n| items.iter().any(|item| values_equal(item, n))),
        (Value::Array(items), n) => items.iter().any(|item| values_equal(item, n)),
        (Value::Object(map), Value::Object(sub)) => sub
            .iter()
            .all(|(key, value)| map.get(key).is_some_and(|v| contains(v, value))),
        (Value::String(text), Value::String(fragment)) => text.contains(fragment.as_str()),
        (a, b) => values_equal(a, b),
    }
}

/// SQL `ILIKE`: `%` matches any run, `_` exactly one character.
fn ilike(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // matched[j]: pattern prefix matches text prefix of length j
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for p in &pattern {
        let mut next = vec![false; text.len() + 1];
        if *p == '%' {
            next[0] = matched[0];
        }
        for j in 1..=text.len() {
            next[j] = match p {
                '%' => matched[j] || next[j - 1],
                '_' => matched[j - 1],
                c => matched[j - 1] && *c == text[j - 1],
            };
        }
        matched = next;
    }
    matched[text.len()]
}

/// Order like Postgres: nulls sort as the largest value, so they come last
/// ascending and first descending.
fn order_rows(rows: &mut [Record], column: &str, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let a = a.get(column).filter(|v| !v.is_null());
        let b = b.get(column).filter(|v| !v.is_null());
        let ordering = match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use kazi_core::{new_entity_id, to_record};
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
    }

    fn seed(store: &InMemoryDatastore, scores: &[i64]) {
        runtime().block_on(async {
            for score in scores {
                let row = to_record(&json!({"id": new_entity_id(), "score": score}))
                    .expect("object");
                store.insert("scores", row).await.expect("insert");
            }
        });
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// A select never returns more rows than its limit, and the offset
        /// window lines up with the unpaginated result.
        #[test]
        fn prop_limit_and_offset_window(
            scores in prop::collection::vec(-1000i64..1000, 0..40),
            offset in 0usize..50,
            limit in 0usize..20,
        ) {
            let store = InMemoryDatastore::new();
            seed(&store, &scores);
            let rt = runtime();

            let all = rt.block_on(store.select(
                &Query::table("scores").order_by("score", SortDirection::Asc),
            )).expect("select all");
            let page = rt.block_on(store.select(
                &Query::table("scores")
                    .order_by("score", SortDirection::Asc)
                    .offset(offset)
                    .limit(limit),
            )).expect("select page");

            prop_assert!(page.len() <= limit);
            let expected: Vec<Record> = all.into_iter().skip(offset).take(limit).collect();
            prop_assert_eq!(page, expected);
        }

        /// A range filter returns exactly the rows satisfying it.
        #[test]
        fn prop_range_filter_is_exact(
            scores in prop::collection::vec(-100i64..100, 0..30),
            threshold in -100i64..100,
        ) {
            let store = InMemoryDatastore::new();
            seed(&store, &scores);

            let rows = runtime().block_on(store.select(
                &Query::table("scores").filter(FilterExpr::gt("score", json!(threshold))),
            )).expect("select");

            let expected = scores.iter().filter(|s| **s > threshold).count();
            prop_assert_eq!(rows.len(), expected);
        }

        /// A batch whose last mutation fails its guard leaves the store
        /// exactly as it was.
        #[test]
        fn prop_failed_batch_changes_nothing(
            scores in prop::collection::vec(0i64..100, 1..20),
        ) {
            let store = InMemoryDatastore::new();
            seed(&store, &scores);
            let rt = runtime();
            let before = rt.block_on(store.dump("scores"));

            let batch = vec![
                Mutation::delete("scores", vec![FilterExpr::gte("score", json!(0))]),
                Mutation::update(
                    "scores",
                    vec![FilterExpr::eq("id", json!(new_entity_id()))],
                    Record::new(),
                ).required(),
            ];
            prop_assert!(rt.block_on(store.execute(batch)).is_err());
            prop_assert_eq!(rt.block_on(store.dump("scores")), before);
        }
    }
}
