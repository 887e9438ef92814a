//! Filter expressions for table-scoped selects and mutations.
//!
//! A list of `FilterExpr` is an implicit conjunction: every expression must
//! hold for a row to match.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// JSON containment, or substring for plain strings
    Contains,
    /// Case-insensitive pattern match with `%` wildcards
    #[serde(rename = "ilike")]
    ILike,
    /// In list of values
    In,
    /// Column is null (value ignored)
    IsNull,
    /// Column is not null (value ignored)
    NotNull,
}

impl FilterOperator {
    pub const fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte
        )
    }
}

/// Single field comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FilterExpr {
    /// Column to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub value: Value,
}

impl FilterExpr {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Lte, value)
    }

    pub fn contains(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    /// Case-insensitive match; `%` matches any run of characters.
    pub fn ilike(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::ILike, Value::String(pattern.into()))
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOperator::In, Value::Array(values))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, Value::Null)
    }

    pub fn not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::NotNull, Value::Null)
    }
}

/// Sort direction for ordered selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors_set_operator() {
        assert_eq!(FilterExpr::eq("status", json!("open")).operator, FilterOperator::Eq);
        assert_eq!(FilterExpr::gte("score", json!(10)).operator, FilterOperator::Gte);
        assert_eq!(FilterExpr::is_null("deleted_at").value, Value::Null);
        assert_eq!(
            FilterExpr::ilike("name", "%acme%").value,
            Value::String("%acme%".to_string())
        );
    }

    #[test]
    fn test_operator_serde_names() {
        assert_eq!(serde_json::to_value(FilterOperator::ILike).expect("ser"), json!("ilike"));
        assert_eq!(serde_json::to_value(FilterOperator::IsNull).expect("ser"), json!("is_null"));
        let op: FilterOperator = serde_json::from_value(json!("gte")).expect("de");
        assert!(op.is_range());
    }

    #[test]
    fn test_sort_direction_default_is_desc() {
        assert_eq!(SortDirection::default(), SortDirection::Desc);
        assert_eq!(SortDirection::Asc.as_sql(), "ASC");
    }
}
