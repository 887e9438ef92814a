//! Enum types for KAZI resources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub(crate) fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// Discriminator for polymorphic attachment (comments, versions, approvals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Invoice,
    InvoiceItem,
    InvoiceMilestone,
    Lead,
    Ticket,
    BugReport,
    Comment,
    DocumentVersion,
    AutomationTrigger,
    Approval,
    Locale,
    EmailAlias,
    Project,
    Client,
    Task,
    File,
}

impl EntityType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Invoice => "invoice",
            EntityType::InvoiceItem => "invoice_item",
            EntityType::InvoiceMilestone => "invoice_milestone",
            EntityType::Lead => "lead",
            EntityType::Ticket => "ticket",
            EntityType::BugReport => "bug_report",
            EntityType::Comment => "comment",
            EntityType::DocumentVersion => "document_version",
            EntityType::AutomationTrigger => "automation_trigger",
            EntityType::Approval => "approval",
            EntityType::Locale => "locale",
            EntityType::EmailAlias => "email_alias",
            EntityType::Project => "project",
            EntityType::Client => "client",
            EntityType::Task => "task",
            EntityType::File => "file",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "invoice" => Ok(EntityType::Invoice),
            "invoiceitem" => Ok(EntityType::InvoiceItem),
            "invoicemilestone" | "milestone" => Ok(EntityType::InvoiceMilestone),
            "lead" => Ok(EntityType::Lead),
            "ticket" | "supportticket" => Ok(EntityType::Ticket),
            "bugreport" | "bug" => Ok(EntityType::BugReport),
            "comment" => Ok(EntityType::Comment),
            "documentversion" | "version" => Ok(EntityType::DocumentVersion),
            "automationtrigger" | "trigger" => Ok(EntityType::AutomationTrigger),
            "approval" => Ok(EntityType::Approval),
            "locale" | "userlocale" => Ok(EntityType::Locale),
            "emailalias" | "alias" => Ok(EntityType::EmailAlias),
            "project" => Ok(EntityType::Project),
            "client" => Ok(EntityType::Client),
            "task" => Ok(EntityType::Task),
            "file" => Ok(EntityType::File),
            _ => Err(format!("Invalid EntityType: {}", s)),
        }
    }
}

// ============================================================================
// LIFECYCLE ENUMS
// ============================================================================

/// Declares a lifecycle enum stored as a lowercase string column.
///
/// Generates the serde mapping, `as_str`, `Display`, tolerant `FromStr`,
/// `Default` and an `ALL` listing used by the stats helpers.
macro_rules! lifecycle_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = normalize_token(s);
                $(
                    if normalized == normalize_token($text)
                        $(|| normalized == normalize_token($alias))*
                    {
                        return Ok($name::$variant);
                    }
                )+
                Err(format!("Invalid {}: {}", stringify!($name), s))
            }
        }
    };
}

lifecycle_enum! {
    /// Invoice lifecycle. Created invoices start out pending.
    InvoiceStatus, default = Pending {
        Draft => "draft",
        Pending => "pending",
        Sent => "sent",
        Paid => "paid",
        /// Funds released to the payee.
        Completed => "completed" | "released",
        Overdue => "overdue",
        Cancelled => "cancelled" | "canceled",
    }
}

impl InvoiceStatus {
    /// Statuses from which funds can still be released.
    pub const fn can_release(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending | InvoiceStatus::Sent | InvoiceStatus::Paid | InvoiceStatus::Overdue
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Completed | InvoiceStatus::Cancelled)
    }

    /// Counted as settled for paid-rate statistics.
    pub const fn is_settled(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Completed)
    }
}

lifecycle_enum! {
    /// Escrow milestone of an invoice. Work is completed by the payee and
    /// then approved or rejected by the payer.
    MilestoneStatus, default = Pending {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Disputed => "disputed",
        Approved => "approved",
        Rejected => "rejected",
    }
}

impl MilestoneStatus {
    /// Statuses from which deliverables can be handed in.
    pub const fn accepts_delivery(&self) -> bool {
        matches!(
            self,
            MilestoneStatus::Pending | MilestoneStatus::InProgress | MilestoneStatus::Rejected
        )
    }
}

lifecycle_enum! {
    /// How escrowed funds are paid in. Drives the processing fee rate.
    PaymentMethod, default = Stripe {
        Stripe => "stripe",
        Paypal => "paypal",
        BankTransfer => "bank_transfer" | "bank",
        Crypto => "crypto",
        WireTransfer => "wire_transfer" | "wire",
        CreditCard => "credit_card" | "card",
    }
}

lifecycle_enum! {
    /// Sales pipeline stage of a lead.
    LeadStatus, default = New {
        New => "new",
        Contacted => "contacted",
        Qualified => "qualified",
        Proposal => "proposal",
        Won => "won",
        Lost => "lost",
    }
}

lifecycle_enum! {
    /// Support ticket lifecycle.
    TicketStatus, default = Open {
        Open => "open",
        Assigned => "assigned",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

impl TicketStatus {
    pub const fn is_finished(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

lifecycle_enum! {
    TicketPriority, default = Medium {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

lifecycle_enum! {
    BugSeverity, default = Medium {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

lifecycle_enum! {
    BugStatus, default = Open {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
        WontFix => "wont_fix",
    }
}

lifecycle_enum! {
    /// Automation trigger lifecycle. Only active triggers record executions.
    TriggerStatus, default = Draft {
        Draft => "draft",
        Active => "active",
        Paused => "paused",
        Archived => "archived",
    }
}

lifecycle_enum! {
    /// Outcome of a single automation trigger run.
    ExecutionOutcome, default = Success {
        Success => "success",
        Failure => "failure" | "failed",
    }
}

lifecycle_enum! {
    /// Approval workflow state. Every state other than pending is terminal.
    ApprovalStatus, default = Pending {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled" | "canceled",
        Expired => "expired",
    }
}

impl ApprovalStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

lifecycle_enum! {
    ConnectionStatus, default = Pending {
        Pending => "pending",
        Accepted => "accepted",
        Declined => "declined",
    }
}

/// Status placeholder for resources without a lifecycle column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoStatus;
