//! Comments attached to any entity, with emoji reactions.

use kazi_core::{EntityId, EntityRef, EntityType, NoStatus, OwnerId, Record, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::gateway::{AuditEntry, ResourceGateway, Transition};
use crate::resource::{Cascade, Resource};
use crate::validation::{HasUpdates, ValidateNonEmpty};

/// Longest accepted reaction token.
const MAX_EMOJI_LEN: usize = 32;

/// Cascade entry for resources comments attach to. Reactions go with
/// their comment.
pub const ATTACHED_COMMENTS: Cascade = Cascade::AttachedWith {
    table: "comments",
    children: &[("comment_reactions", "comment_id")],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Comment {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    #[serde(flatten)]
    pub target: EntityRef,
    pub body: String,
    pub reaction_count: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateComment {
    #[serde(flatten)]
    pub target: EntityRef,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateComment {
    pub body: Option<String>,
}

impl HasUpdates for UpdateComment {
    fn has_any_updates(&self) -> bool {
        self.body.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<EntityId>,
}

crate::impl_list_filter!(CommentFilter { entity_type, entity_id });

impl CommentFilter {
    pub fn on(target: EntityRef) -> Self {
        Self {
            entity_type: Some(target.kind),
            entity_id: Some(target.id),
        }
    }
}

impl Resource for Comment {
    type Create = CreateComment;
    type Update = UpdateComment;
    type Filter = CommentFilter;
    type Status = NoStatus;

    const TABLE: &'static str = "comments";
    const ENTITY: EntityType = EntityType::Comment;
    const SOFT_DELETE: bool = true;
    const DEFAULT_LIMIT: usize = 100;
    const ORDER_BY: (&'static str, kazi_core::SortDirection) =
        ("created_at", kazi_core::SortDirection::Asc);
    const CASCADE: &'static [Cascade] = &[Cascade::ForeignKey {
        table: "comment_reactions",
        column: "comment_id",
    }];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> Record {
        super::row(json!({ "reaction_count": 0 }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateComment) -> ApiResult<()> {
        input.body.validate_non_empty("body")
    }

    fn validate_update(input: &UpdateComment) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.body.validate_non_empty("body")
    }
}

impl ResourceGateway<Comment> {
    /// Record a reaction and bump `reaction_count` in the same batch.
    pub async fn react(&self, owner: OwnerId, id: EntityId, emoji: &str) -> ApiResult<Comment> {
        let emoji = emoji.trim();
        emoji.validate_non_empty("emoji")?;
        if emoji.chars().count() > MAX_EMOJI_LEN {
            return Err(crate::error::ApiError::validation_failed(format!(
                "emoji must be at most {} characters",
                MAX_EMOJI_LEN
            )));
        }

        let reaction = AuditEntry::new(
            "comment_reactions",
            "comment_id",
            super::row(json!({ "user_id": owner, "emoji": emoji })),
        );
        self.transition(
            owner,
            id,
            Transition::unchanged()
                .increment("reaction_count", 1)
                .audit(reaction),
        )
        .await
    }
}
