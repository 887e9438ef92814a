//! Entity action modules.
//!
//! One module per domain noun. Each declares its row type and request
//! shapes, implements `Resource`, and adds its domain transitions and stats
//! as inherent methods on `ResourceGateway<Self>`.

pub mod approval;
pub mod automation_trigger;
pub mod bug_report;
pub mod comment;
pub mod document_version;
pub mod email_alias;
pub mod invoice;
pub mod invoice_item;
pub mod invoice_milestone;
pub mod lead;
pub mod locale;
pub mod social;
pub mod ticket;

pub use approval::{Approval, ApprovalDecision, ApprovalFilter, CreateApproval, UpdateApproval};
pub use automation_trigger::{
    AutomationTrigger, CreateTrigger, ExecutionReport, TriggerFilter, UpdateTrigger,
};
pub use bug_report::{BugFilter, BugReport, BugStats, CreateBugReport, UpdateBugReport};
pub use comment::{Comment, CommentFilter, CreateComment, UpdateComment};
pub use document_version::{
    CreateDocumentVersion, DocumentVersion, UpdateDocumentVersion, VersionFilter,
};
pub use email_alias::{CreateEmailAlias, EmailAlias, UpdateEmailAlias};
pub use invoice::{CreateInvoice, Invoice, InvoiceFilter, InvoiceStats, UpdateInvoice};
pub use invoice_item::{CreateInvoiceItem, InvoiceItem, InvoiceItemFilter, UpdateInvoiceItem};
pub use invoice_milestone::{
    CreateInvoiceMilestone, InvoiceMilestone, MilestoneDelivery, MilestoneFilter, MilestoneReview,
    UpdateInvoiceMilestone,
};
pub use lead::{CreateLead, Lead, LeadFilter, LeadStats, UpdateLead};
pub use locale::{CreateLocale, Locale, UpdateLocale};
pub use social::{BlockStatus, BlockedBy, SocialGraph, UserBlock, UserConnection, UserFollow};
pub use ticket::{CreateTicket, Ticket, TicketFilter, TicketStats, UpdateTicket};

use kazi_core::Record;
use serde_json::Value;

/// Unwrap a `json!({...})` literal into a row.
pub(crate) fn row(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
