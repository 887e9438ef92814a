//! Email aliases with one primary address per user.

use kazi_core::{EntityId, EntityType, NoStatus, OwnerId, Record, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::gateway::ResourceGateway;
use crate::resource::{ExclusiveFlag, NoFilter, Resource};
use crate::validation::{validate_email, HasUpdates, ValidateNonEmpty};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EmailAlias {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    pub alias: String,
    pub label: Option<String>,
    pub is_primary: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub verified_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateEmailAlias {
    pub alias: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateEmailAlias {
    pub label: Option<String>,
}

impl HasUpdates for UpdateEmailAlias {
    fn has_any_updates(&self) -> bool {
        self.label.is_some()
    }
}

impl Resource for EmailAlias {
    type Create = CreateEmailAlias;
    type Update = UpdateEmailAlias;
    type Filter = NoFilter;
    type Status = NoStatus;

    const TABLE: &'static str = "email_aliases";
    const ENTITY: EntityType = EntityType::EmailAlias;
    const SOFT_DELETE: bool = true;
    const EXCLUSIVE: Option<ExclusiveFlag> = Some(ExclusiveFlag {
        field: "is_primary",
        scope: &[],
    });
    const UNIQUE: &'static [&'static [&'static str]] = &[&["alias"]];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> Record {
        super::row(json!({ "is_primary": false }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateEmailAlias) -> ApiResult<()> {
        validate_email(&input.alias, "alias")?;
        input.label.validate_non_empty("label")
    }

    fn validate_update(input: &UpdateEmailAlias) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.label.validate_non_empty("label")
    }

    /// Aliases compare case-insensitively, so they are stored lowercased.
    fn input_columns(input: &CreateEmailAlias) -> ApiResult<Record> {
        Ok(super::row(json!({
            "alias": input.alias.trim().to_lowercase(),
            "label": input.label,
        })))
    }
}

impl ResourceGateway<EmailAlias> {
    /// Mark the alias verified. Verifying twice keeps the first stamp.
    pub async fn mark_verified(&self, owner: OwnerId, id: EntityId) -> ApiResult<EmailAlias> {
        let current = self.find_one(owner, id).await?;
        if current.verified_at.is_some() || current.deleted_at.is_some() {
            return Ok(current);
        }
        self.transition(
            owner,
            id,
            crate::gateway::Transition::unchanged().stamp("verified_at"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::resource::Page;
    use kazi_storage::InMemoryDatastore;
    use std::sync::Arc;

    fn alias(address: &str) -> CreateEmailAlias {
        CreateEmailAlias {
            alias: address.to_string(),
            label: None,
        }
    }

    #[tokio::test]
    async fn test_primary_moves_between_aliases() -> Result<(), String> {
        let gw = ResourceGateway::<EmailAlias>::new(Arc::new(InMemoryDatastore::new()));
        let owner = OwnerId::generate();
        let work = gw.create(owner, alias("me@work.io")).await.map_err(|e| e.to_string())?;
        let home = gw.create(owner, alias("me@home.io")).await.map_err(|e| e.to_string())?;

        gw.set_exclusive(owner, work.id).await.map_err(|e| e.to_string())?;
        let home = gw.set_exclusive(owner, home.id).await.map_err(|e| e.to_string())?;
        assert!(home.is_primary);

        let work = gw.find_one(owner, work.id).await.map_err(|e| e.to_string())?;
        assert!(!work.is_primary);
        Ok(())
    }

    #[tokio::test]
    async fn test_alias_unique_until_deleted() -> Result<(), String> {
        let gw = ResourceGateway::<EmailAlias>::new(Arc::new(InMemoryDatastore::new()));
        let owner = OwnerId::generate();
        let first = gw.create(owner, alias("Ops@Kazi.app")).await.map_err(|e| e.to_string())?;
        assert_eq!(first.alias, "ops@kazi.app");

        let err = gw
            .create(owner, alias("ops@kazi.app"))
            .await
            .err()
            .ok_or("duplicate alias accepted")?;
        assert_eq!(err.code, ErrorCode::EntityAlreadyExists);

        gw.soft_delete(owner, first.id).await.map_err(|e| e.to_string())?;
        let second = gw.create(owner, alias("ops@kazi.app")).await.map_err(|e| e.to_string())?;

        let err = gw
            .restore(owner, first.id)
            .await
            .err()
            .ok_or("restore revived a duplicate")?;
        assert_eq!(err.code, ErrorCode::EntityAlreadyExists);

        let live = gw
            .get_many(owner, &NoFilter::default(), Page::default())
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, second.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_verified_is_idempotent() -> Result<(), String> {
        let gw = ResourceGateway::<EmailAlias>::new(Arc::new(InMemoryDatastore::new()));
        let owner = OwnerId::generate();
        let created = gw.create(owner, alias("a@b.co")).await.map_err(|e| e.to_string())?;

        let verified = gw.mark_verified(owner, created.id).await.map_err(|e| e.to_string())?;
        let stamp = verified.verified_at.ok_or("not stamped")?;
        let again = gw.mark_verified(owner, created.id).await.map_err(|e| e.to_string())?;
        assert_eq!(again.verified_at, Some(stamp));
        Ok(())
    }
}
