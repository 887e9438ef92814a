//! Polymorphic attachment target.
//!
//! Comments, document versions and approvals attach to arbitrary rows. In the
//! datastore that is a pair of columns (`entity_type`, `entity_id`); in Rust it
//! is one value, so a row can never carry a kind without an id or vice versa.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::{EntityId, EntityType, FilterExpr};

/// Column holding the target kind.
pub const TARGET_KIND_COLUMN: &str = "entity_type";
/// Column holding the target id.
pub const TARGET_ID_COLUMN: &str = "entity_id";

/// Reference to any attachable row.
///
/// Flatten it into a row struct with `#[serde(flatten)]` to get the two
/// discriminator columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EntityRef {
    #[serde(rename = "entity_type")]
    pub kind: EntityType,
    #[serde(rename = "entity_id")]
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
}

impl EntityRef {
    pub const fn new(kind: EntityType, id: EntityId) -> Self {
        Self { kind, id }
    }

    /// Equality filters selecting rows attached to this target.
    pub fn filters(&self) -> Vec<FilterExpr> {
        vec![
            FilterExpr::eq(TARGET_KIND_COLUMN, json!(self.kind)),
            FilterExpr::eq(TARGET_ID_COLUMN, json!(self.id)),
        ]
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
