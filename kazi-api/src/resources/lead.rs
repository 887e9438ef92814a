//! Sales leads.

use std::collections::BTreeMap;

use kazi_core::{EntityId, EntityType, LeadStatus, OwnerId, Record, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::gateway::{AuditEntry, ResourceGateway, Transition};
use crate::resource::{Cascade, Resource};
use crate::stats::{self, Bucket, Coverage};
use crate::validation::{validate_email, HasUpdates, ValidateNonEmpty, ValidateRange};

use super::comment::ATTACHED_COMMENTS;

/// Score buckets used for churn-risk style summaries.
pub const SCORE_BUCKETS: &[Bucket] = &[
    Bucket { label: "cold", min: 0.0 },
    Bucket { label: "warm", min: 40.0 },
    Bucket { label: "hot", min: 70.0 },
];

const OPEN_STAGES: &[LeadStatus] = &[
    LeadStatus::New,
    LeadStatus::Contacted,
    LeadStatus::Qualified,
    LeadStatus::Proposal,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Lead {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub score: i32,
    pub source: Option<String>,
    pub status: LeadStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub assigned_to: Option<EntityId>,
    pub lost_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateLead {
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub score: Option<i32>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateLead {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub score: Option<i32>,
    pub source: Option<String>,
}

impl HasUpdates for UpdateLead {
    fn has_any_updates(&self) -> bool {
        self.name.is_some()
            || self.email.is_some()
            || self.company.is_some()
            || self.score.is_some()
            || self.source.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<String>,
    pub assigned_to: Option<EntityId>,
}

crate::impl_list_filter!(LeadFilter { status, source, assigned_to });

impl Resource for Lead {
    type Create = CreateLead;
    type Update = UpdateLead;
    type Filter = LeadFilter;
    type Status = LeadStatus;

    const TABLE: &'static str = "leads";
    const ENTITY: EntityType = EntityType::Lead;
    const STATUS_FIELD: Option<&'static str> = Some("status");
    const SOFT_DELETE: bool = true;
    const DEFAULT_LIMIT: usize = 100;
    const CASCADE: &'static [Cascade] = &[
        Cascade::ForeignKey {
            table: "lead_assignments",
            column: "lead_id",
        },
        ATTACHED_COMMENTS,
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> Record {
        super::row(json!({ "score": 0 }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateLead) -> ApiResult<()> {
        input.name.validate_non_empty("name")?;
        if let Some(email) = &input.email {
            validate_email(email, "email")?;
        }
        if let Some(score) = input.score {
            score.validate_range("score", 0, 100)?;
        }
        Ok(())
    }

    fn validate_update(input: &UpdateLead) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.name.validate_non_empty("name")?;
        if let Some(email) = &input.email {
            validate_email(email, "email")?;
        }
        if let Some(score) = input.score {
            score.validate_range("score", 0, 100)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LeadStats {
    pub by_status: BTreeMap<String, u64>,
    pub average_score: Option<f64>,
    pub by_score_bucket: BTreeMap<String, u64>,
    /// Won leads over decided (won + lost) leads, in percent.
    pub win_rate: f64,
    #[serde(flatten)]
    pub coverage: Coverage,
}

impl ResourceGateway<Lead> {
    /// Hand the lead to `assignee`, recording the hand-off.
    pub async fn assign(&self, owner: OwnerId, id: EntityId, assignee: EntityId) -> ApiResult<Lead> {
        let audit = AuditEntry::new(
            "lead_assignments",
            "lead_id",
            super::row(json!({ "assigned_by": owner, "assigned_to": assignee })),
        );
        self.transition(
            owner,
            id,
            Transition::unchanged()
                .set("assigned_to", json!(assignee))
                .audit(audit),
        )
        .await
    }

    pub async fn contact(&self, owner: OwnerId, id: EntityId) -> ApiResult<Lead> {
        self.transition(
            owner,
            id,
            Transition::to(LeadStatus::Contacted).from(&[LeadStatus::New]),
        )
        .await
    }

    pub async fn qualify(&self, owner: OwnerId, id: EntityId) -> ApiResult<Lead> {
        self.transition(
            owner,
            id,
            Transition::to(LeadStatus::Qualified)
                .from(&[LeadStatus::New, LeadStatus::Contacted]),
        )
        .await
    }

    pub async fn mark_won(&self, owner: OwnerId, id: EntityId) -> ApiResult<Lead> {
        self.transition(owner, id, Transition::to(LeadStatus::Won).from(OPEN_STAGES))
            .await
    }

    pub async fn mark_lost(
        &self,
        owner: OwnerId,
        id: EntityId,
        reason: Option<String>,
    ) -> ApiResult<Lead> {
        let mut transition = Transition::to(LeadStatus::Lost).from(OPEN_STAGES);
        if let Some(reason) = reason {
            transition = transition.set("lost_reason", json!(reason));
        }
        self.transition(owner, id, transition).await
    }

    pub async fn stats(&self, owner: OwnerId, cap: usize) -> ApiResult<LeadStats> {
        let window = self.fetch_window(owner, &LeadFilter::default(), cap).await?;
        let rows = &window.items;
        let won = rows.iter().filter(|l| l.status == LeadStatus::Won).count() as u64;
        let lost = rows.iter().filter(|l| l.status == LeadStatus::Lost).count() as u64;

        Ok(LeadStats {
            by_status: stats::count_by(rows, "status"),
            average_score: stats::average(rows, "score"),
            by_score_bucket: stats::bucket(rows, "score", SCORE_BUCKETS),
            win_rate: stats::percentage(won, won + lost),
            coverage: window.coverage(),
        })
    }
}
