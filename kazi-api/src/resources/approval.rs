//! Approval workflow: a pending request against any entity that is decided
//! exactly once.

use kazi_core::{ApprovalStatus, EntityId, EntityRef, EntityType, OwnerId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::gateway::{now, AuditEntry, ResourceGateway, Transition};
use crate::resource::{Cascade, Page, Resource, MAX_PAGE_SIZE};
use crate::validation::{HasUpdates, ValidateNonEmpty};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Approval {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    #[serde(flatten)]
    pub target: EntityRef,
    pub title: String,
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub requested_from: Option<EntityId>,
    pub status: ApprovalStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub expires_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub decided_at: Option<Timestamp>,
    pub decision_note: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl Approval {
    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires| expires <= at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateApproval {
    #[serde(flatten)]
    pub target: EntityRef,
    pub title: String,
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub requested_from: Option<EntityId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateApproval {
    pub title: Option<String>,
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub expires_at: Option<Timestamp>,
}

impl HasUpdates for UpdateApproval {
    fn has_any_updates(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.expires_at.is_some()
    }
}

/// Body of the approve/reject/cancel actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApprovalDecision {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<EntityId>,
    pub requested_from: Option<EntityId>,
}

crate::impl_list_filter!(ApprovalFilter { status, entity_type, entity_id, requested_from });

impl Resource for Approval {
    type Create = CreateApproval;
    type Update = UpdateApproval;
    type Filter = ApprovalFilter;
    type Status = ApprovalStatus;

    const TABLE: &'static str = "approvals";
    const ENTITY: EntityType = EntityType::Approval;
    const STATUS_FIELD: Option<&'static str> = Some("status");
    const CASCADE: &'static [Cascade] = &[Cascade::ForeignKey {
        table: "approval_events",
        column: "approval_id",
    }];

    fn id(&self) -> EntityId {
        self.id
    }

    fn validate_create(_owner: OwnerId, input: &CreateApproval) -> ApiResult<()> {
        input.title.validate_non_empty("title")?;
        if input.expires_at.is_some_and(|at| at <= now()) {
            return Err(ApiError::validation_failed("expires_at must be in the future"));
        }
        Ok(())
    }

    fn validate_update(input: &UpdateApproval) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.title.validate_non_empty("title")
    }
}

impl ResourceGateway<Approval> {
    pub async fn approve(
        &self,
        owner: OwnerId,
        id: EntityId,
        decision: ApprovalDecision,
    ) -> ApiResult<Approval> {
        self.decide(owner, id, ApprovalStatus::Approved, decision.note)
            .await
    }

    pub async fn reject(
        &self,
        owner: OwnerId,
        id: EntityId,
        decision: ApprovalDecision,
    ) -> ApiResult<Approval> {
        self.decide(owner, id, ApprovalStatus::Rejected, decision.note)
            .await
    }

    pub async fn cancel(
        &self,
        owner: OwnerId,
        id: EntityId,
        decision: ApprovalDecision,
    ) -> ApiResult<Approval> {
        self.decide(owner, id, ApprovalStatus::Cancelled, decision.note)
            .await
    }

    /// Move a pending approval to `expired`.
    pub async fn expire(&self, owner: OwnerId, id: EntityId) -> ApiResult<Approval> {
        self.apply_decision(owner, id, ApprovalStatus::Expired, None)
            .await
    }

    /// Expire every pending approval of `owner` whose deadline has passed.
    /// Returns the approvals that were expired.
    pub async fn expire_overdue(&self, owner: OwnerId) -> ApiResult<Vec<Approval>> {
        let filter = ApprovalFilter {
            status: Some(ApprovalStatus::Pending),
            ..Default::default()
        };
        let at = now();
        let pending = self
            .get_many(owner, &filter, Page::new(MAX_PAGE_SIZE, 0))
            .await?;

        let mut expired = Vec::new();
        for approval in pending.into_iter().filter(|a| a.is_expired_at(at)) {
            match self.expire(owner, approval.id).await {
                Ok(updated) => expired.push(updated),
                // Decided concurrently; nothing left to expire.
                Err(e) if e.code == crate::error::ErrorCode::StateConflict => {}
                Err(e) => return Err(e),
            }
        }
        if !expired.is_empty() {
            info!(owner = %owner, count = expired.len(), "Expired overdue approvals");
        }
        Ok(expired)
    }

    /// Decide a pending approval. A passed deadline wins over the decision:
    /// the approval is stored as expired and the call fails.
    async fn decide(
        &self,
        owner: OwnerId,
        id: EntityId,
        status: ApprovalStatus,
        note: Option<String>,
    ) -> ApiResult<Approval> {
        let current = self.find_one(owner, id).await?;
        if current.status == ApprovalStatus::Pending && current.is_expired_at(now()) {
            self.expire(owner, id).await?;
            return Err(ApiError::state_conflict(format!(
                "approval {} expired before it was {}",
                id, status
            )));
        }
        self.apply_decision(owner, id, status, note).await
    }

    async fn apply_decision(
        &self,
        owner: OwnerId,
        id: EntityId,
        status: ApprovalStatus,
        note: Option<String>,
    ) -> ApiResult<Approval> {
        let event = AuditEntry::new(
            "approval_events",
            "approval_id",
            super::row(json!({
                "user_id": owner,
                "event_type": status,
                "note": note,
            })),
        );
        let mut transition = Transition::to(status)
            .from(&[ApprovalStatus::Pending])
            .stamp("decided_at")
            .audit(event);
        if let Some(note) = note {
            transition = transition.set("decision_note", json!(note));
        }
        self.transition(owner, id, transition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Duration;
    use kazi_core::FilterExpr;
    use kazi_storage::{Datastore, InMemoryDatastore, Mutation, Query};
    use std::sync::Arc;

    fn request(target: EntityRef) -> CreateApproval {
        CreateApproval {
            target,
            title: "Release milestone payment".to_string(),
            description: None,
            requested_from: None,
            expires_at: Some(now() + Duration::days(3)),
        }
    }

    #[tokio::test]
    async fn test_decided_once() -> Result<(), String> {
        let store = Arc::new(InMemoryDatastore::new());
        let gw = ResourceGateway::<Approval>::new(store.clone());
        let owner = OwnerId::generate();
        let target = EntityRef::new(EntityType::Invoice, kazi_core::new_entity_id());
        let created = gw.create(owner, request(target)).await.map_err(|e| e.to_string())?;
        assert_eq!(created.status, ApprovalStatus::Pending);

        let approved = gw
            .approve(
                owner,
                created.id,
                ApprovalDecision {
                    note: Some("ok".to_string()),
                },
            )
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.decision_note.as_deref(), Some("ok"));
        assert!(approved.decided_at.is_some());

        let err = gw
            .reject(owner, created.id, ApprovalDecision::default())
            .await
            .err()
            .ok_or("approval decided twice")?;
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert_eq!(store.row_count("approval_events").await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_passed_deadline_expires_on_decision() -> Result<(), String> {
        let store = Arc::new(InMemoryDatastore::new());
        let gw = ResourceGateway::<Approval>::new(store.clone());
        let owner = OwnerId::generate();
        let target = EntityRef::new(EntityType::Project, kazi_core::new_entity_id());
        let created = gw.create(owner, request(target)).await.map_err(|e| e.to_string())?;

        // Move the deadline into the past behind the gateway's back.
        let mut patch = kazi_core::Record::new();
        patch.insert("expires_at".to_string(), json!(now() - Duration::hours(1)));
        store
            .execute(vec![Mutation::update(
                "approvals",
                vec![FilterExpr::eq("id", json!(created.id))],
                patch,
            )])
            .await
            .map_err(|e| e.to_string())?;

        let err = gw
            .approve(owner, created.id, ApprovalDecision::default())
            .await
            .err()
            .ok_or("expired approval was approved")?;
        assert_eq!(err.code, ErrorCode::StateConflict);

        let stored = gw.find_one(owner, created.id).await.map_err(|e| e.to_string())?;
        assert_eq!(stored.status, ApprovalStatus::Expired);

        let events = store
            .select(&Query::table("approval_events"))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], json!("expired"));
        Ok(())
    }

    #[tokio::test]
    async fn test_expire_overdue_sweeps_only_past_deadlines() -> Result<(), String> {
        let store = Arc::new(InMemoryDatastore::new());
        let gw = ResourceGateway::<Approval>::new(store.clone());
        let owner = OwnerId::generate();
        let target = EntityRef::new(EntityType::Task, kazi_core::new_entity_id());
        let stale = gw.create(owner, request(target)).await.map_err(|e| e.to_string())?;
        let fresh = gw.create(owner, request(target)).await.map_err(|e| e.to_string())?;

        let mut patch = kazi_core::Record::new();
        patch.insert("expires_at".to_string(), json!(now() - Duration::minutes(5)));
        store
            .execute(vec![Mutation::update(
                "approvals",
                vec![FilterExpr::eq("id", json!(stale.id))],
                patch,
            )])
            .await
            .map_err(|e| e.to_string())?;

        let expired = gw.expire_overdue(owner).await.map_err(|e| e.to_string())?;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);

        let fresh = gw.find_one(owner, fresh.id).await.map_err(|e| e.to_string())?;
        assert_eq!(fresh.status, ApprovalStatus::Pending);
        Ok(())
    }

    #[test]
    fn test_create_rejects_past_deadline() {
        let target = EntityRef::new(EntityType::Client, kazi_core::new_entity_id());
        let input = CreateApproval {
            expires_at: Some(now() - Duration::seconds(1)),
            ..request(target)
        };
        assert!(Approval::validate_create(OwnerId::generate(), &input).is_err());
    }
}
