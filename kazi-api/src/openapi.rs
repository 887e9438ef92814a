//! OpenAPI Specification for the KAZI API
//!
//! Generated with utoipa from the route annotations and the schema derives
//! on resource types. Served at `/openapi.json`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::middleware::API_KEY_HEADER;
use crate::resources::{
    Approval, ApprovalDecision, AutomationTrigger, BlockStatus, BlockedBy, BugReport, BugStats,
    Comment, ExecutionReport, Invoice, InvoiceMilestone, InvoiceStats, Lead, LeadStats,
    MilestoneDelivery, MilestoneReview, Ticket, TicketStats, UserBlock,
};
use crate::routes::{
    approval, bug, comment, health, invoice, lead, milestone, social, ticket, trigger,
};

use kazi_core::{
    EntityRef, EntityType, EscrowFees, HealthStatus, MilestoneStatus, OwnerId, PaymentMethod,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "KAZI API",
        version = "0.1.0",
        description = "Resource action gateway: owner-scoped CRUD, lifecycle transitions and stats for KAZI business entities",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Invoices", description = "Invoices, milestones, escrow release, fees and billing stats"),
        (name = "Tickets", description = "Support ticket lifecycle"),
        (name = "Leads", description = "Sales pipeline"),
        (name = "Bugs", description = "Bug reports"),
        (name = "Comments", description = "Comments and reactions on any entity"),
        (name = "Triggers", description = "Automation triggers and execution log"),
        (name = "Approvals", description = "Approval workflow"),
        (name = "Social", description = "Follows, connections and blocks"),
    ),
    paths(
        health::liveness,
        health::readiness,
        invoice::release_funds,
        invoice::send_invoice,
        invoice::invoice_stats,
        invoice::invoice_fees,
        milestone::complete_milestone,
        milestone::reject_milestone,
        ticket::assign_ticket,
        ticket::ticket_stats,
        lead::assign_lead,
        lead::lead_stats,
        bug::bug_stats,
        comment::add_reaction,
        trigger::activate_trigger,
        trigger::record_execution,
        approval::approve,
        social::block_user,
        social::unblock_user,
        social::block_status,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        EntityRef,
        EntityType,
        OwnerId,
        HealthStatus,
        Invoice,
        InvoiceStats,
        InvoiceMilestone,
        MilestoneStatus,
        MilestoneDelivery,
        MilestoneReview,
        EscrowFees,
        PaymentMethod,
        Ticket,
        TicketStats,
        Lead,
        LeadStats,
        BugReport,
        BugStats,
        Comment,
        AutomationTrigger,
        ExecutionReport,
        Approval,
        ApprovalDecision,
        UserBlock,
        BlockStatus,
        BlockedBy,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `api_key` and `bearer_auth` schemes the paths refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT with `sub` = principal id and a `permissions` claim"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_action_paths() -> Result<(), String> {
        let doc = ApiDoc::openapi();
        for path in [
            "/health/ready",
            "/api/v1/invoices/{id}/release",
            "/api/v1/social/blocks",
            "/api/v1/approvals/{id}/approve",
            "/api/v1/invoices/{id}/fees",
            "/api/v1/invoice-milestones/{id}/complete",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        let json = ApiDoc::to_json().map_err(|e| e.to_string())?;
        assert!(json.contains("bearer_auth"));
        Ok(())
    }

    #[test]
    fn test_id_and_time_fields_render_as_formatted_strings() -> Result<(), String> {
        let json = ApiDoc::to_json().map_err(|e| e.to_string())?;
        let doc: serde_json::Value = serde_json::from_str(&json).map_err(|e| e.to_string())?;
        let schemas = &doc["components"]["schemas"];

        let invoice = &schemas["Invoice"]["properties"];
        assert_eq!(invoice["id"]["type"], "string");
        assert_eq!(invoice["id"]["format"], "uuid");
        assert_eq!(invoice["created_at"]["format"], "date-time");

        let target = &schemas["EntityRef"]["properties"];
        assert_eq!(target["entity_id"]["format"], "uuid");
        Ok(())
    }
}
