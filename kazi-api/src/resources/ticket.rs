//! Support tickets.

use std::collections::BTreeMap;

use kazi_core::{EntityId, EntityType, OwnerId, Timestamp, TicketPriority, TicketStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::gateway::{AuditEntry, ResourceGateway, Transition};
use crate::resource::{Cascade, Resource};
use crate::stats::{self, Coverage};
use crate::validation::{HasUpdates, ValidateNonEmpty};

use super::comment::ATTACHED_COMMENTS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Ticket {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    pub subject: String,
    pub description: Option<String>,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub assigned_to: Option<EntityId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub assigned_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub resolved_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub closed_at: Option<Timestamp>,
    pub resolution: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateTicket {
    pub subject: String,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateTicket {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
}

impl HasUpdates for UpdateTicket {
    fn has_any_updates(&self) -> bool {
        self.subject.is_some() || self.description.is_some() || self.priority.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<EntityId>,
}

crate::impl_list_filter!(TicketFilter { status, priority, assigned_to });

impl Resource for Ticket {
    type Create = CreateTicket;
    type Update = UpdateTicket;
    type Filter = TicketFilter;
    type Status = TicketStatus;

    const TABLE: &'static str = "support_tickets";
    const ENTITY: EntityType = EntityType::Ticket;
    const STATUS_FIELD: Option<&'static str> = Some("status");
    const DEFAULT_LIMIT: usize = 50;
    const CASCADE: &'static [Cascade] = &[
        Cascade::ForeignKey {
            table: "ticket_assignment_history",
            column: "ticket_id",
        },
        ATTACHED_COMMENTS,
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> kazi_core::Record {
        super::row(json!({ "priority": TicketPriority::default() }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateTicket) -> ApiResult<()> {
        input.subject.validate_non_empty("subject")
    }

    fn validate_update(input: &UpdateTicket) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.subject.validate_non_empty("subject")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TicketStats {
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub open: u64,
    /// Resolved or closed tickets over all tickets, in percent.
    pub resolution_rate: f64,
    #[serde(flatten)]
    pub coverage: Coverage,
}

impl ResourceGateway<Ticket> {
    /// Assign an agent. Reassigning an in-flight ticket is allowed and
    /// recorded like the first assignment.
    pub async fn assign(&self, owner: OwnerId, id: EntityId, agent: EntityId) -> ApiResult<Ticket> {
        let previous = self.find_one(owner, id).await?.assigned_to;
        let audit = AuditEntry::new(
            "ticket_assignment_history",
            "ticket_id",
            super::row(json!({
                "assigned_by": owner,
                "assigned_to": agent,
                "previous_assignee": previous,
            })),
        );
        self.transition(
            owner,
            id,
            Transition::to(TicketStatus::Assigned)
                .from(&[
                    TicketStatus::Open,
                    TicketStatus::Assigned,
                    TicketStatus::InProgress,
                ])
                .stamp("assigned_at")
                .set("assigned_to", json!(agent))
                .audit(audit),
        )
        .await
    }

    pub async fn start(&self, owner: OwnerId, id: EntityId) -> ApiResult<Ticket> {
        self.transition(
            owner,
            id,
            Transition::to(TicketStatus::InProgress)
                .from(&[TicketStatus::Open, TicketStatus::Assigned]),
        )
        .await
    }

    pub async fn resolve(
        &self,
        owner: OwnerId,
        id: EntityId,
        resolution: Option<String>,
    ) -> ApiResult<Ticket> {
        let mut transition = Transition::to(TicketStatus::Resolved)
            .from(&[
                TicketStatus::Open,
                TicketStatus::Assigned,
                TicketStatus::InProgress,
            ])
            .stamp("resolved_at");
        if let Some(resolution) = resolution {
            transition = transition.set("resolution", json!(resolution));
        }
        self.transition(owner, id, transition).await
    }

    pub async fn close(&self, owner: OwnerId, id: EntityId) -> ApiResult<Ticket> {
        self.transition(
            owner,
            id,
            Transition::to(TicketStatus::Closed)
                .from(&[
                    TicketStatus::Open,
                    TicketStatus::Assigned,
                    TicketStatus::InProgress,
                    TicketStatus::Resolved,
                ])
                .stamp("closed_at"),
        )
        .await
    }

    pub async fn stats(&self, owner: OwnerId, cap: usize) -> ApiResult<TicketStats> {
        let window = self.fetch_window(owner, &TicketFilter::default(), cap).await?;
        let rows = &window.items;
        let finished = rows.iter().filter(|t| t.status.is_finished()).count() as u64;

        Ok(TicketStats {
            by_status: stats::count_by(rows, "status"),
            by_priority: stats::count_by(rows, "priority"),
            open: rows.len() as u64 - finished,
            resolution_rate: stats::percentage(finished, rows.len() as u64),
            coverage: window.coverage(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use kazi_storage::InMemoryDatastore;
    use std::sync::Arc;

    fn ticket(subject: &str) -> CreateTicket {
        CreateTicket {
            subject: subject.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ticket_lifecycle() -> Result<(), String> {
        let store = Arc::new(InMemoryDatastore::new());
        let gw = ResourceGateway::<Ticket>::new(store.clone());
        let owner = OwnerId::generate();
        let created = gw.create(owner, ticket("Login fails")).await.map_err(|e| e.to_string())?;
        assert_eq!(created.status, TicketStatus::Open);
        assert_eq!(created.priority, TicketPriority::Medium);

        let agent = kazi_core::new_entity_id();
        let assigned = gw.assign(owner, created.id, agent).await.map_err(|e| e.to_string())?;
        assert_eq!(assigned.status, TicketStatus::Assigned);
        assert!(assigned.assigned_at.is_some());
        assert_eq!(store.row_count("ticket_assignment_history").await, 1);

        let resolved = gw
            .resolve(owner, created.id, Some("password reset".to_string()))
            .await
            .map_err(|e| e.to_string())?;
        assert!(resolved.resolved_at.is_some());

        let closed = gw.close(owner, created.id).await.map_err(|e| e.to_string())?;
        assert!(closed.closed_at.is_some());

        let err = gw
            .start(owner, created.id)
            .await
            .err()
            .ok_or("closed ticket restarted")?;
        assert_eq!(err.code, ErrorCode::StateConflict);
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_resolution_rate() -> Result<(), String> {
        let gw = ResourceGateway::<Ticket>::new(Arc::new(InMemoryDatastore::new()));
        let owner = OwnerId::generate();
        let a = gw.create(owner, ticket("a")).await.map_err(|e| e.to_string())?;
        gw.create(owner, ticket("b")).await.map_err(|e| e.to_string())?;
        gw.resolve(owner, a.id, None).await.map_err(|e| e.to_string())?;

        let stats = gw.stats(owner, 50).await.map_err(|e| e.to_string())?;
        assert_eq!(stats.open, 1);
        assert_eq!(stats.resolution_rate, 50.0);
        assert_eq!(stats.by_priority.get("medium"), Some(&2));
        Ok(())
    }
}
