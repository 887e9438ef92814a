//! Per-user locales with a single default.

use kazi_core::{EntityId, EntityType, NoStatus, OwnerId, Record, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::gateway::ResourceGateway;
use crate::resource::{ExclusiveFlag, NoFilter, Resource};
use crate::validation::{validate_locale_code, HasUpdates, ValidateNonEmpty};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Locale {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    pub locale_code: String,
    pub display_name: Option<String>,
    pub is_default: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateLocale {
    pub locale_code: String,
    pub display_name: Option<String>,
    /// Make this the default once inserted.
    #[serde(default, skip_serializing)]
    pub make_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateLocale {
    pub display_name: Option<String>,
}

impl HasUpdates for UpdateLocale {
    fn has_any_updates(&self) -> bool {
        self.display_name.is_some()
    }
}

impl Resource for Locale {
    type Create = CreateLocale;
    type Update = UpdateLocale;
    type Filter = NoFilter;
    type Status = NoStatus;

    const TABLE: &'static str = "user_locales";
    const ENTITY: EntityType = EntityType::Locale;
    const EXCLUSIVE: Option<ExclusiveFlag> = Some(ExclusiveFlag {
        field: "is_default",
        scope: &[],
    });
    const UNIQUE: &'static [&'static [&'static str]] = &[&["locale_code"]];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> Record {
        super::row(json!({ "is_default": false }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateLocale) -> ApiResult<()> {
        validate_locale_code(&input.locale_code)?;
        input.display_name.validate_non_empty("display_name")
    }

    fn validate_update(input: &UpdateLocale) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.display_name.validate_non_empty("display_name")
    }
}

impl ResourceGateway<Locale> {
    /// Create a locale and, when requested, make it the user's default.
    pub async fn add_locale(&self, owner: OwnerId, input: CreateLocale) -> ApiResult<Locale> {
        if input.make_default {
            return self.create_exclusive(owner, input).await;
        }
        self.create(owner, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::resource::Page;
    use kazi_storage::InMemoryDatastore;
    use std::sync::Arc;

    fn locale(code: &str) -> CreateLocale {
        CreateLocale {
            locale_code: code.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_single_default_per_user() -> Result<(), String> {
        let gw = ResourceGateway::<Locale>::new(Arc::new(InMemoryDatastore::new()));
        let owner = OwnerId::generate();
        let other = OwnerId::generate();

        let en = gw.add_locale(owner, CreateLocale { make_default: true, ..locale("en-US") })
            .await
            .map_err(|e| e.to_string())?;
        assert!(en.is_default);
        let theirs = gw
            .add_locale(other, CreateLocale { make_default: true, ..locale("en-US") })
            .await
            .map_err(|e| e.to_string())?;

        let fr = gw.add_locale(owner, locale("fr-FR")).await.map_err(|e| e.to_string())?;
        assert!(!fr.is_default);
        let fr = gw.set_exclusive(owner, fr.id).await.map_err(|e| e.to_string())?;
        assert!(fr.is_default);

        let mine = gw
            .get_many(owner, &NoFilter::default(), Page::default())
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(mine.iter().filter(|l| l.is_default).count(), 1);

        let theirs = gw.find_one(other, theirs.id).await.map_err(|e| e.to_string())?;
        assert!(theirs.is_default, "other users' defaults are untouched");
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts() -> Result<(), String> {
        let gw = ResourceGateway::<Locale>::new(Arc::new(InMemoryDatastore::new()));
        let owner = OwnerId::generate();
        gw.create(owner, locale("de")).await.map_err(|e| e.to_string())?;

        let err = gw
            .create(owner, locale("de"))
            .await
            .err()
            .ok_or("duplicate locale accepted")?;
        assert_eq!(err.code, ErrorCode::EntityAlreadyExists);

        gw.create(OwnerId::generate(), locale("de"))
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
