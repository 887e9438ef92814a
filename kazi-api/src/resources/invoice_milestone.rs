//! Escrow milestones of an invoice, owned through their invoice.
//!
//! The payee hands in deliverables (`complete`), the payer then approves or
//! rejects. A rejected milestone can be completed again.

use chrono::NaiveDate;
use kazi_core::{EntityId, EntityType, MilestoneStatus, OwnerId, SortDirection, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::gateway::{ResourceGateway, Transition};
use crate::resource::{Ownership, Resource};
use crate::validation::{HasUpdates, ValidateNonEmpty, ValidateRange};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InvoiceMilestone {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub invoice_id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub amount: f64,
    /// Share of the invoice total, 0 to 100.
    pub percentage: f64,
    pub status: MilestoneStatus,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub deliverables: Vec<String>,
    pub approval_notes: Option<String>,
    pub rejection_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub approved_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub rejected_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateInvoiceMilestone {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub invoice_id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub amount: f64,
    pub percentage: f64,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateInvoiceMilestone {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub percentage: Option<f64>,
    pub due_date: Option<NaiveDate>,
}

impl HasUpdates for UpdateInvoiceMilestone {
    fn has_any_updates(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.amount.is_some()
            || self.percentage.is_some()
            || self.due_date.is_some()
    }
}

/// Body of `POST /invoice-milestones/:id/complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MilestoneDelivery {
    #[serde(default)]
    pub deliverables: Vec<String>,
}

/// Body of the approve and reject actions. Rejections need a note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MilestoneReview {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MilestoneFilter {
    pub invoice_id: Option<EntityId>,
    pub status: Option<MilestoneStatus>,
}

crate::impl_list_filter!(MilestoneFilter { invoice_id, status });

impl Resource for InvoiceMilestone {
    type Create = CreateInvoiceMilestone;
    type Update = UpdateInvoiceMilestone;
    type Filter = MilestoneFilter;
    type Status = MilestoneStatus;

    const TABLE: &'static str = "invoice_milestones";
    const ENTITY: EntityType = EntityType::InvoiceMilestone;
    const OWNERSHIP: Ownership = Ownership::Parent {
        column: "invoice_id",
        parent_table: "invoices",
        parent_owner: "user_id",
    };
    const STATUS_FIELD: Option<&'static str> = Some("status");
    const DEFAULT_LIMIT: usize = 100;
    const ORDER_BY: (&'static str, SortDirection) = ("created_at", SortDirection::Asc);

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> kazi_core::Record {
        super::row(json!({ "deliverables": [] }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateInvoiceMilestone) -> ApiResult<()> {
        input.title.validate_non_empty("title")?;
        input.amount.validate_non_negative("amount")?;
        input.percentage.validate_range("percentage", 0.0, 100.0)
    }

    fn validate_update(input: &UpdateInvoiceMilestone) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.title.validate_non_empty("title")?;
        if let Some(amount) = input.amount {
            amount.validate_non_negative("amount")?;
        }
        if let Some(percentage) = input.percentage {
            percentage.validate_range("percentage", 0.0, 100.0)?;
        }
        Ok(())
    }
}

impl ResourceGateway<InvoiceMilestone> {
    pub async fn complete(
        &self,
        owner: OwnerId,
        id: EntityId,
        delivery: MilestoneDelivery,
    ) -> ApiResult<InvoiceMilestone> {
        let transition = Transition::to(MilestoneStatus::Completed)
            .from(&[
                MilestoneStatus::Pending,
                MilestoneStatus::InProgress,
                MilestoneStatus::Rejected,
            ])
            .stamp("completed_at")
            .set("deliverables", json!(delivery.deliverables));
        self.transition(owner, id, transition).await
    }

    pub async fn approve(
        &self,
        owner: OwnerId,
        id: EntityId,
        review: MilestoneReview,
    ) -> ApiResult<InvoiceMilestone> {
        let transition = Transition::to(MilestoneStatus::Approved)
            .from(&[MilestoneStatus::Completed])
            .stamp("approved_at")
            .set("approval_notes", json!(review.note));
        self.transition(owner, id, transition).await
    }

    pub async fn reject(
        &self,
        owner: OwnerId,
        id: EntityId,
        review: MilestoneReview,
    ) -> ApiResult<InvoiceMilestone> {
        let reason = review
            .note
            .filter(|note| !note.trim().is_empty())
            .ok_or_else(|| ApiError::missing_field("note"))?;
        let transition = Transition::to(MilestoneStatus::Rejected)
            .from(&[MilestoneStatus::Completed])
            .stamp("rejected_at")
            .set("rejection_reason", json!(reason));
        self.transition(owner, id, transition).await
    }
}
