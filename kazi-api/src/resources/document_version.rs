//! Numbered document versions, one current version per target.

use kazi_core::{EntityId, EntityRef, EntityType, NoStatus, OwnerId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::gateway::ResourceGateway;
use crate::resource::{ExclusiveFlag, Page, Resource, MAX_PAGE_SIZE};
use crate::validation::{HasUpdates, ValidateNonEmpty, ValidateRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DocumentVersion {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    #[serde(flatten)]
    pub target: EntityRef,
    pub version_number: i32,
    pub content: String,
    pub change_summary: Option<String>,
    pub is_current: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateDocumentVersion {
    #[serde(flatten)]
    pub target: EntityRef,
    /// Assigned as one past the latest version when omitted.
    pub version_number: Option<i32>,
    pub content: String,
    pub change_summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateDocumentVersion {
    pub change_summary: Option<String>,
}

impl HasUpdates for UpdateDocumentVersion {
    fn has_any_updates(&self) -> bool {
        self.change_summary.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<EntityId>,
    pub is_current: Option<bool>,
}

crate::impl_list_filter!(VersionFilter { entity_type, entity_id, is_current });

impl VersionFilter {
    pub fn on(target: EntityRef) -> Self {
        Self {
            entity_type: Some(target.kind),
            entity_id: Some(target.id),
            is_current: None,
        }
    }
}

impl Resource for DocumentVersion {
    type Create = CreateDocumentVersion;
    type Update = UpdateDocumentVersion;
    type Filter = VersionFilter;
    type Status = NoStatus;

    const TABLE: &'static str = "document_versions";
    const ENTITY: EntityType = EntityType::DocumentVersion;
    const ORDER_BY: (&'static str, kazi_core::SortDirection) =
        ("version_number", kazi_core::SortDirection::Desc);
    const EXCLUSIVE: Option<ExclusiveFlag> = Some(ExclusiveFlag {
        field: "is_current",
        scope: &["entity_type", "entity_id"],
    });
    const UNIQUE: &'static [&'static [&'static str]] =
        &[&["entity_type", "entity_id", "version_number"]];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> kazi_core::Record {
        super::row(serde_json::json!({ "is_current": false }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateDocumentVersion) -> ApiResult<()> {
        input.content.validate_non_empty("content")?;
        if let Some(number) = input.version_number {
            number.validate_range("version_number", 1, i32::MAX)?;
        }
        Ok(())
    }

    fn validate_update(input: &UpdateDocumentVersion) -> ApiResult<()> {
        input.validate_has_updates()
    }
}

impl ResourceGateway<DocumentVersion> {
    /// Store a new version of `target` as the current one. The insert and
    /// the sibling clear commit in one batch. Two publishers racing on the
    /// same number are stopped by the unique scope.
    pub async fn publish(
        &self,
        owner: OwnerId,
        mut input: CreateDocumentVersion,
    ) -> ApiResult<DocumentVersion> {
        if input.version_number.is_none() {
            let latest = self
                .get_many(owner, &VersionFilter::on(input.target), Page::new(1, 0))
                .await?;
            let next = latest.first().map_or(1, |v| v.version_number.saturating_add(1));
            input.version_number = Some(next);
        }
        self.create_exclusive(owner, input).await
    }

    /// The version currently marked current for `target`, if any.
    pub async fn current(
        &self,
        owner: OwnerId,
        target: EntityRef,
    ) -> ApiResult<Option<DocumentVersion>> {
        let filter = VersionFilter {
            is_current: Some(true),
            ..VersionFilter::on(target)
        };
        Ok(self
            .get_many(owner, &filter, Page::new(1, 0))
            .await?
            .into_iter()
            .next())
    }

    /// Every version of `target`, newest first.
    pub async fn history(
        &self,
        owner: OwnerId,
        target: EntityRef,
    ) -> ApiResult<Vec<DocumentVersion>> {
        self.get_many(owner, &VersionFilter::on(target), Page::new(MAX_PAGE_SIZE, 0))
            .await
    }
}
