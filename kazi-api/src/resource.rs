//! Resource trait for the generic action gateway.
//!
//! Every domain noun (invoice, lead, ticket, ...) implements `Resource` once:
//! table name, ownership rule, soft-delete flag, cascade children, exclusive
//! flag and unique scopes are declared as associated constants, and the
//! request shapes as associated types. `ResourceGateway<R>` turns that
//! metadata into owner-scoped queries and atomic mutation batches.

use kazi_core::{
    to_record, EntityId, EntityType, FilterExpr, OwnerId, Record, SortDirection,
    CREATED_AT_COLUMN,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Hard ceiling on any page or stats window.
pub const MAX_PAGE_SIZE: usize = 500;

// ============================================================================
// METADATA TYPES
// ============================================================================

/// How a row is tied to the acting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The row carries the owner id in this column.
    Column(&'static str),
    /// The row belongs to a parent row that carries the owner id.
    Parent {
        /// Foreign key on this table pointing at the parent id.
        column: &'static str,
        parent_table: &'static str,
        /// Owner column on the parent table.
        parent_owner: &'static str,
    },
}

impl Ownership {
    /// Owner column on the resource's own table, if any.
    pub const fn owner_column(&self) -> Option<&'static str> {
        match self {
            Ownership::Column(column) => Some(column),
            Ownership::Parent { .. } => None,
        }
    }
}

/// Dependent rows removed before a hard delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cascade {
    /// Rows in `table` whose `column` holds the parent id.
    ForeignKey {
        table: &'static str,
        column: &'static str,
    },
    /// Rows in `table` attached through `entity_type`/`entity_id`.
    Attached { table: &'static str },
    /// Attached rows that have dependents of their own. Each `(table, column)`
    /// child is cleared by the attached rows' ids before they go.
    AttachedWith {
        table: &'static str,
        children: &'static [(&'static str, &'static str)],
    },
}

/// Boolean column that is true for at most one row per scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusiveFlag {
    pub field: &'static str,
    /// Columns whose values define the scope, read from the target row.
    pub scope: &'static [&'static str],
}

/// Limit/offset pagination as received from callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Effective limit: the resource default when absent, never above the ceiling.
    pub fn resolved_limit(&self, default_limit: usize) -> usize {
        self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn resolved_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

// ============================================================================
// LIST FILTER TRAIT
// ============================================================================

/// Optional list filters.
///
/// Each present field contributes one filter expression, so the resulting
/// WHERE clause only contains what the caller asked for.
pub trait ListFilter {
    fn filters(&self) -> Vec<FilterExpr>;
}

/// Filter with no conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoFilter {}

impl ListFilter for NoFilter {
    fn filters(&self) -> Vec<FilterExpr> {
        Vec::new()
    }
}

/// Push `FilterExpr::eq(field, value)` when the option is set.
pub fn push_eq<T: Serialize>(filters: &mut Vec<FilterExpr>, field: &str, value: &Option<T>) {
    if let Some(value) = value {
        if let Ok(json) = serde_json::to_value(value) {
            filters.push(FilterExpr::eq(field, json));
        }
    }
}

// ============================================================================
// RESOURCE TRAIT
// ============================================================================

/// A typed row managed by `ResourceGateway`.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Caller input for `create`.
    type Create: Serialize + Send + Sync;

    /// Partial field set for `update`; `None` fields are left untouched.
    type Update: Serialize + Send + Sync;

    /// Optional list filters.
    type Filter: ListFilter + Default + Send + Sync;

    /// Lifecycle enum, `NoStatus` for stateless rows.
    type Status: Serialize + Default + Copy + Send + Sync;

    const TABLE: &'static str;
    const ENTITY: EntityType;
    const OWNERSHIP: Ownership = Ownership::Column("user_id");

    /// Column holding `Self::Status`, if the row has a lifecycle.
    const STATUS_FIELD: Option<&'static str> = None;
    const SOFT_DELETE: bool = false;
    const DEFAULT_LIMIT: usize = 50;
    const ORDER_BY: (&'static str, SortDirection) = (CREATED_AT_COLUMN, SortDirection::Desc);
    const CASCADE: &'static [Cascade] = &[];
    const EXCLUSIVE: Option<ExclusiveFlag> = None;

    /// Unique scopes. The owner column is implied for directly owned rows.
    const UNIQUE: &'static [&'static [&'static str]] = &[];

    fn id(&self) -> EntityId;

    /// Server-assigned defaults merged under the caller input.
    fn defaults() -> Record {
        Record::new()
    }

    fn validate_create(_owner: OwnerId, _input: &Self::Create) -> ApiResult<()> {
        Ok(())
    }

    fn validate_update(_input: &Self::Update) -> ApiResult<()> {
        Ok(())
    }

    /// Turn validated input into columns. Override to derive stored columns
    /// (digests, normalized values) from input-only fields.
    fn input_columns(input: &Self::Create) -> ApiResult<Record> {
        Ok(to_record(input)?)
    }

    /// Recompute derived columns of an update patch from the current row.
    fn derive_update(_current: &Record, _patch: &mut Record) {}

    fn not_found(id: EntityId) -> ApiError {
        ApiError::entity_not_found(Self::ENTITY.as_str(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_resolution() {
        let page = Page::default();
        assert_eq!(page.resolved_limit(25), 25);
        assert_eq!(page.resolved_offset(), 0);

        let page = Page::new(10_000, 40);
        assert_eq!(page.resolved_limit(25), MAX_PAGE_SIZE);
        assert_eq!(page.resolved_offset(), 40);

        let page = Page::new(0, 0);
        assert_eq!(page.resolved_limit(25), 1);
    }

    #[test]
    fn test_no_filter_is_empty() {
        assert!(NoFilter::default().filters().is_empty());
    }

    #[test]
    fn test_push_eq_skips_absent_values() {
        let mut filters = Vec::new();
        push_eq::<String>(&mut filters, "status", &None);
        push_eq(&mut filters, "status", &Some("open"));
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].value, serde_json::json!("open"));
    }

    #[test]
    fn test_ownership_owner_column() {
        assert_eq!(Ownership::Column("user_id").owner_column(), Some("user_id"));
        let parent = Ownership::Parent {
            column: "invoice_id",
            parent_table: "invoices",
            parent_owner: "user_id",
        };
        assert_eq!(parent.owner_column(), None);
    }
}
