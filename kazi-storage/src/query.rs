//! Query and mutation descriptions handed to a `Datastore`.
//!
//! Both are plain data so that backends can compile them (SQL) or interpret
//! them (in-memory) without the gateway knowing which one it talks to.

use kazi_core::{FilterExpr, Record, SortDirection, StorageError};

use crate::StorageResult;

/// Longest identifier Postgres accepts without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Reject anything that is not a plain lowercase SQL identifier.
///
/// Table and column names are interpolated into SQL by the Postgres backend,
/// so only `[a-z_][a-z0-9_]*` is allowed.
pub fn validate_identifier(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_head && valid_tail && name.len() <= MAX_IDENTIFIER_LEN {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

fn validate_filters(filters: &[FilterExpr]) -> StorageResult<()> {
    filters.iter().try_for_each(|f| validate_identifier(&f.field))
}

fn validate_columns(row: &Record) -> StorageResult<()> {
    row.keys().try_for_each(|k| validate_identifier(k))
}

// ============================================================================
// SELECT
// ============================================================================

/// Table-scoped select: filters, one ordering column, limit/offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<FilterExpr>,
    pub order: Option<(String, SortDirection)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = FilterExpr>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Inclusive row range, `range(0, 9)` being the first ten rows.
    pub fn range(self, from: usize, to: usize) -> Self {
        let limit = to.saturating_sub(from) + 1;
        self.offset(from).limit(limit)
    }

    pub fn validate(&self) -> StorageResult<()> {
        validate_identifier(&self.table)?;
        validate_filters(&self.filters)?;
        if let Some((column, _)) = &self.order {
            validate_identifier(column)?;
        }
        Ok(())
    }
}

// ============================================================================
// MUTATIONS
// ============================================================================

/// One write inside an atomic batch.
///
/// `require_match` turns "affected zero rows" into `StorageError::NoMatch`,
/// which rolls back every other mutation of the batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert {
        table: String,
        row: Record,
    },
    Update {
        table: String,
        filters: Vec<FilterExpr>,
        patch: Record,
        require_match: bool,
    },
    /// Insert, or update the existing row sharing the conflict target columns.
    /// On conflict `id`, `created_at` and the target columns keep their values.
    Upsert {
        table: String,
        row: Record,
        conflict_target: Vec<String>,
    },
    Delete {
        table: String,
        filters: Vec<FilterExpr>,
        require_match: bool,
    },
    /// `field = coalesce(field, 0) + by` in a single statement.
    Increment {
        table: String,
        filters: Vec<FilterExpr>,
        field: String,
        by: i64,
        require_match: bool,
    },
}

impl Mutation {
    pub fn insert(table: impl Into<String>, row: Record) -> Self {
        Mutation::Insert {
            table: table.into(),
            row,
        }
    }

    pub fn update(table: impl Into<String>, filters: Vec<FilterExpr>, patch: Record) -> Self {
        Mutation::Update {
            table: table.into(),
            filters,
            patch,
            require_match: false,
        }
    }

    pub fn upsert<S: Into<String>>(
        table: impl Into<String>,
        row: Record,
        conflict_target: impl IntoIterator<Item = S>,
    ) -> Self {
        Mutation::Upsert {
            table: table.into(),
            row,
            conflict_target: conflict_target.into_iter().map(Into::into).collect(),
        }
    }

    pub fn delete(table: impl Into<String>, filters: Vec<FilterExpr>) -> Self {
        Mutation::Delete {
            table: table.into(),
            filters,
            require_match: false,
        }
    }

    pub fn increment(
        table: impl Into<String>,
        filters: Vec<FilterExpr>,
        field: impl Into<String>,
        by: i64,
    ) -> Self {
        Mutation::Increment {
            table: table.into(),
            filters,
            field: field.into(),
            by,
            require_match: false,
        }
    }

    /// Fail the whole batch if this mutation touches no row.
    pub fn required(mut self) -> Self {
        match &mut self {
            Mutation::Update { require_match, .. }
            | Mutation::Delete { require_match, .. }
            | Mutation::Increment { require_match, .. } => *require_match = true,
            Mutation::Insert { .. } | Mutation::Upsert { .. } => {}
        }
        self
    }

    pub fn table(&self) -> &str {
        match self {
            Mutation::Insert { table, .. }
            | Mutation::Update { table, .. }
            | Mutation::Upsert { table, .. }
            | Mutation::Delete { table, .. }
            | Mutation::Increment { table, .. } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "insert",
            Mutation::Update { .. } => "update",
            Mutation::Upsert { .. } => "upsert",
            Mutation::Delete { .. } => "delete",
            Mutation::Increment { .. } => "increment",
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        validate_identifier(self.table())?;
        match self {
            Mutation::Insert { row, .. } => validate_columns(row),
            Mutation::Update { filters, patch, .. } => {
                validate_filters(filters)?;
                validate_columns(patch)
            }
            Mutation::Upsert {
                row,
                conflict_target,
                ..
            } => {
                validate_columns(row)?;
                if conflict_target.is_empty() {
                    return Err(StorageError::InvalidIdentifier {
                        name: "<empty conflict target>".to_string(),
                    });
                }
                conflict_target.iter().try_for_each(|c| validate_identifier(c))
            }
            Mutation::Delete { filters, .. } => validate_filters(filters),
            Mutation::Increment { filters, field, .. } => {
                validate_filters(filters)?;
                validate_identifier(field)
            }
        }
    }
}

/// Result of one mutation: the rows it returned and how many it touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationOutcome {
    pub rows: Vec<Record>,
    pub affected: u64,
}

impl MutationOutcome {
    pub fn rows(rows: Vec<Record>) -> Self {
        let affected = rows.len() as u64;
        Self { rows, affected }
    }

    pub fn deleted(affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected,
        }
    }

    pub fn first(self) -> Option<Record> {
        self.rows.into_iter().next()
    }
}
