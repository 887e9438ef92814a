//! Bug reports.

use std::collections::BTreeMap;

use kazi_core::{BugSeverity, BugStatus, EntityId, EntityType, OwnerId, Record, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::gateway::{ResourceGateway, Transition};
use crate::resource::{Cascade, Resource};
use crate::stats::{self, Coverage};
use crate::validation::{HasUpdates, ValidateNonEmpty};

use super::comment::ATTACHED_COMMENTS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BugReport {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    pub title: String,
    pub description: Option<String>,
    pub severity: BugSeverity,
    pub status: BugStatus,
    pub steps_to_reproduce: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub resolved_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateBugReport {
    pub title: String,
    pub description: Option<String>,
    pub severity: Option<BugSeverity>,
    pub steps_to_reproduce: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateBugReport {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<BugSeverity>,
    pub status: Option<BugStatus>,
    pub steps_to_reproduce: Option<String>,
}

impl HasUpdates for UpdateBugReport {
    fn has_any_updates(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.severity.is_some()
            || self.status.is_some()
            || self.steps_to_reproduce.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BugFilter {
    pub severity: Option<BugSeverity>,
    pub status: Option<BugStatus>,
}

crate::impl_list_filter!(BugFilter { severity, status });

impl Resource for BugReport {
    type Create = CreateBugReport;
    type Update = UpdateBugReport;
    type Filter = BugFilter;
    type Status = BugStatus;

    const TABLE: &'static str = "bug_reports";
    const ENTITY: EntityType = EntityType::BugReport;
    const STATUS_FIELD: Option<&'static str> = Some("status");
    const SOFT_DELETE: bool = true;
    const DEFAULT_LIMIT: usize = 50;
    const CASCADE: &'static [Cascade] = &[ATTACHED_COMMENTS];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> Record {
        super::row(json!({ "severity": BugSeverity::default() }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateBugReport) -> ApiResult<()> {
        input.title.validate_non_empty("title")
    }

    fn validate_update(input: &UpdateBugReport) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.title.validate_non_empty("title")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BugStats {
    pub by_severity: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub critical_open: u64,
    #[serde(flatten)]
    pub coverage: Coverage,
}

impl ResourceGateway<BugReport> {
    pub async fn resolve(&self, owner: OwnerId, id: EntityId) -> ApiResult<BugReport> {
        self.transition(
            owner,
            id,
            Transition::to(BugStatus::Resolved)
                .from(&[BugStatus::Open, BugStatus::InProgress])
                .stamp("resolved_at"),
        )
        .await
    }

    pub async fn stats(&self, owner: OwnerId, cap: usize) -> ApiResult<BugStats> {
        let window = self.fetch_window(owner, &BugFilter::default(), cap).await?;
        let rows = &window.items;
        let critical_open = rows
            .iter()
            .filter(|b| {
                b.severity == BugSeverity::Critical
                    && matches!(b.status, BugStatus::Open | BugStatus::InProgress)
            })
            .count() as u64;

        Ok(BugStats {
            by_severity: stats::count_by(rows, "severity"),
            by_status: stats::count_by(rows, "status"),
            critical_open,
            coverage: window.coverage(),
        })
    }
}
