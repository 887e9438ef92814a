//! Automation triggers and their execution log.

use kazi_core::{EntityId, EntityType, ExecutionOutcome, OwnerId, Record, Timestamp, TriggerStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::gateway::{AuditEntry, ResourceGateway, Transition};
use crate::resource::{Cascade, Resource};
use crate::validation::{HasUpdates, ValidateNonEmpty};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AutomationTrigger {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    pub name: String,
    pub event_type: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub conditions: Value,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub action: Value,
    pub status: TriggerStatus,
    pub run_count: i64,
    pub failure_count: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub activated_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_run_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateTrigger {
    pub name: String,
    pub event_type: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub conditions: Option<Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub action: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateTrigger {
    pub name: Option<String>,
    pub event_type: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub conditions: Option<Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub action: Option<Value>,
}

impl HasUpdates for UpdateTrigger {
    fn has_any_updates(&self) -> bool {
        self.name.is_some()
            || self.event_type.is_some()
            || self.conditions.is_some()
            || self.action.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerFilter {
    pub status: Option<TriggerStatus>,
    pub event_type: Option<String>,
}

crate::impl_list_filter!(TriggerFilter { status, event_type });

/// Body of `POST /triggers/:id/executions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ExecutionReport {
    pub outcome: ExecutionOutcome,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

fn require_object(value: &Value, field: &str) -> ApiResult<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(crate::error::ApiError::invalid_format(field, "JSON object"))
    }
}

impl Resource for AutomationTrigger {
    type Create = CreateTrigger;
    type Update = UpdateTrigger;
    type Filter = TriggerFilter;
    type Status = TriggerStatus;

    const TABLE: &'static str = "automation_triggers";
    const ENTITY: EntityType = EntityType::AutomationTrigger;
    const STATUS_FIELD: Option<&'static str> = Some("status");
    const CASCADE: &'static [Cascade] = &[Cascade::ForeignKey {
        table: "trigger_executions",
        column: "trigger_id",
    }];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> Record {
        super::row(json!({
            "conditions": {},
            "run_count": 0,
            "failure_count": 0,
        }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateTrigger) -> ApiResult<()> {
        input.name.validate_non_empty("name")?;
        input.event_type.validate_non_empty("event_type")?;
        if let Some(conditions) = &input.conditions {
            require_object(conditions, "conditions")?;
        }
        require_object(&input.action, "action")
    }

    fn validate_update(input: &UpdateTrigger) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.name.validate_non_empty("name")?;
        input.event_type.validate_non_empty("event_type")?;
        if let Some(conditions) = &input.conditions {
            require_object(conditions, "conditions")?;
        }
        if let Some(action) = &input.action {
            require_object(action, "action")?;
        }
        Ok(())
    }
}

impl ResourceGateway<AutomationTrigger> {
    pub async fn activate(&self, owner: OwnerId, id: EntityId) -> ApiResult<AutomationTrigger> {
        self.transition(
            owner,
            id,
            Transition::to(TriggerStatus::Active)
                .from(&[TriggerStatus::Draft, TriggerStatus::Paused])
                .stamp("activated_at"),
        )
        .await
    }

    pub async fn pause(&self, owner: OwnerId, id: EntityId) -> ApiResult<AutomationTrigger> {
        self.transition(
            owner,
            id,
            Transition::to(TriggerStatus::Paused).from(&[TriggerStatus::Active]),
        )
        .await
    }

    pub async fn archive(&self, owner: OwnerId, id: EntityId) -> ApiResult<AutomationTrigger> {
        self.transition(
            owner,
            id,
            Transition::to(TriggerStatus::Archived).from(&[
                TriggerStatus::Draft,
                TriggerStatus::Active,
                TriggerStatus::Paused,
            ]),
        )
        .await
    }

    /// Log one run of an active trigger: bump the counter for its outcome,
    /// stamp `last_run_at` and append to `trigger_executions`, atomically.
    pub async fn record_execution(
        &self,
        owner: OwnerId,
        id: EntityId,
        report: ExecutionReport,
    ) -> ApiResult<AutomationTrigger> {
        let counter = match report.outcome {
            ExecutionOutcome::Success => "run_count",
            ExecutionOutcome::Failure => "failure_count",
        };
        let log = AuditEntry::new(
            "trigger_executions",
            "trigger_id",
            super::row(json!({
                "user_id": owner,
                "outcome": report.outcome,
                "error_message": report.error_message,
                "duration_ms": report.duration_ms,
            })),
        );
        self.transition(
            owner,
            id,
            Transition::unchanged()
                .from(&[TriggerStatus::Active])
                .stamp("last_run_at")
                .increment(counter, 1)
                .audit(log),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use kazi_storage::InMemoryDatastore;
    use std::sync::Arc;

    fn trigger() -> CreateTrigger {
        CreateTrigger {
            name: "Overdue reminder".to_string(),
            event_type: "invoice.overdue".to_string(),
            conditions: None,
            action: json!({ "send_email": "reminder" }),
        }
    }

    fn report(outcome: ExecutionOutcome) -> ExecutionReport {
        ExecutionReport {
            outcome,
            error_message: None,
            duration_ms: Some(12),
        }
    }

    #[tokio::test]
    async fn test_executions_only_on_active_triggers() -> Result<(), String> {
        let store = Arc::new(InMemoryDatastore::new());
        let gw = ResourceGateway::<AutomationTrigger>::new(store.clone());
        let owner = OwnerId::generate();
        let created = gw.create(owner, trigger()).await.map_err(|e| e.to_string())?;
        assert_eq!(created.status, TriggerStatus::Draft);
        assert_eq!(created.conditions, json!({}));

        let err = gw
            .record_execution(owner, created.id, report(ExecutionOutcome::Success))
            .await
            .err()
            .ok_or("draft trigger executed")?;
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert_eq!(store.row_count("trigger_executions").await, 0);

        let active = gw.activate(owner, created.id).await.map_err(|e| e.to_string())?;
        assert!(active.activated_at.is_some());

        gw.record_execution(owner, created.id, report(ExecutionOutcome::Success))
            .await
            .map_err(|e| e.to_string())?;
        let after = gw
            .record_execution(owner, created.id, report(ExecutionOutcome::Failure))
            .await
            .map_err(|e| e.to_string())?;
        assert_eq!(after.run_count, 1);
        assert_eq!(after.failure_count, 1);
        assert!(after.last_run_at.is_some());
        assert_eq!(store.row_count("trigger_executions").await, 2);

        gw.pause(owner, created.id).await.map_err(|e| e.to_string())?;
        gw.archive(owner, created.id).await.map_err(|e| e.to_string())?;
        let err = gw
            .activate(owner, created.id)
            .await
            .err()
            .ok_or("archived trigger reactivated")?;
        assert_eq!(err.code, ErrorCode::StateConflict);
        Ok(())
    }

    #[test]
    fn test_action_must_be_an_object() {
        let input = CreateTrigger {
            action: json!("send"),
            ..trigger()
        };
        assert!(AutomationTrigger::validate_create(OwnerId::generate(), &input).is_err());
    }
}
