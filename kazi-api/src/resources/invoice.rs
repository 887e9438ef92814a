//! Invoices with escrow-style fund release.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use kazi_core::{
    digest_secret, to_record, verify_secret, EntityId, EntityType, EscrowFees, InvoiceStatus,
    OwnerId, PaymentMethod, Record, Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::gateway::{AuditEntry, ResourceGateway, Transition};
use crate::resource::{Cascade, Resource};
use crate::stats::{self, Coverage};
use crate::validation::{validate_currency, validate_email, HasUpdates, ValidateNonEmpty, ValidateRange};

use super::comment::ATTACHED_COMMENTS;

/// Statuses funds can be released from.
const RELEASABLE: &[InvoiceStatus] = &[
    InvoiceStatus::Pending,
    InvoiceStatus::Sent,
    InvoiceStatus::Paid,
    InvoiceStatus::Overdue,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Invoice {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub user_id: OwnerId,
    pub invoice_number: Option<String>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub total_amount: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub progress_percentage: i32,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// SHA-256 digest of the release password. Never sent to clients.
    #[serde(default, skip_serializing)]
    pub completion_password_hash: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub paid_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub cancelled_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateInvoice {
    pub invoice_number: Option<String>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub total_amount: f64,
    pub currency: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Plaintext release password; only its digest is stored.
    #[serde(default, skip_serializing)]
    pub completion_password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateInvoice {
    pub invoice_number: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub total_amount: Option<f64>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl HasUpdates for UpdateInvoice {
    fn has_any_updates(&self) -> bool {
        self.invoice_number.is_some()
            || self.client_name.is_some()
            || self.client_email.is_some()
            || self.total_amount.is_some()
            || self.due_date.is_some()
            || self.notes.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub currency: Option<String>,
    pub client_email: Option<String>,
}

crate::impl_list_filter!(InvoiceFilter { status, currency, client_email });

impl Resource for Invoice {
    type Create = CreateInvoice;
    type Update = UpdateInvoice;
    type Filter = InvoiceFilter;
    type Status = InvoiceStatus;

    const TABLE: &'static str = "invoices";
    const ENTITY: EntityType = EntityType::Invoice;
    const STATUS_FIELD: Option<&'static str> = Some("status");
    const SOFT_DELETE: bool = true;
    const DEFAULT_LIMIT: usize = 50;
    const CASCADE: &'static [Cascade] = &[
        Cascade::ForeignKey {
            table: "invoice_items",
            column: "invoice_id",
        },
        Cascade::ForeignKey {
            table: "invoice_milestones",
            column: "invoice_id",
        },
        Cascade::ForeignKey {
            table: "invoice_transactions",
            column: "invoice_id",
        },
        ATTACHED_COMMENTS,
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn defaults() -> Record {
        super::row(json!({ "currency": "USD", "progress_percentage": 0 }))
    }

    fn validate_create(_owner: OwnerId, input: &CreateInvoice) -> ApiResult<()> {
        input.client_name.validate_non_empty("client_name")?;
        input.total_amount.validate_non_negative("total_amount")?;
        if let Some(email) = &input.client_email {
            validate_email(email, "client_email")?;
        }
        if let Some(currency) = &input.currency {
            validate_currency(currency)?;
        }
        input.completion_password.validate_non_empty("completion_password")
    }

    fn validate_update(input: &UpdateInvoice) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.client_name.validate_non_empty("client_name")?;
        if let Some(amount) = input.total_amount {
            amount.validate_non_negative("total_amount")?;
        }
        if let Some(email) = &input.client_email {
            validate_email(email, "client_email")?;
        }
        Ok(())
    }

    fn input_columns(input: &CreateInvoice) -> ApiResult<Record> {
        let mut columns = to_record(input)?;
        if let Some(password) = &input.completion_password {
            columns.insert(
                "completion_password_hash".to_string(),
                json!(digest_secret(password)),
            );
        }
        Ok(columns)
    }
}

/// Invoice summary over a bounded window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InvoiceStats {
    pub by_status: BTreeMap<String, u64>,
    pub total_billed: f64,
    pub total_outstanding: f64,
    /// Share of invoices that are paid or completed, in percent.
    pub paid_rate: f64,
    #[serde(flatten)]
    pub coverage: Coverage,
}

impl ResourceGateway<Invoice> {
    pub async fn send(&self, owner: OwnerId, id: EntityId) -> ApiResult<Invoice> {
        self.transition(
            owner,
            id,
            Transition::to(InvoiceStatus::Sent)
                .from(&[InvoiceStatus::Draft, InvoiceStatus::Pending]),
        )
        .await
    }

    pub async fn mark_paid(&self, owner: OwnerId, id: EntityId) -> ApiResult<Invoice> {
        self.transition(
            owner,
            id,
            Transition::to(InvoiceStatus::Paid)
                .from(&[
                    InvoiceStatus::Pending,
                    InvoiceStatus::Sent,
                    InvoiceStatus::Overdue,
                ])
                .stamp("paid_at"),
        )
        .await
    }

    pub async fn cancel(&self, owner: OwnerId, id: EntityId) -> ApiResult<Invoice> {
        self.transition(
            owner,
            id,
            Transition::to(InvoiceStatus::Cancelled)
                .from(&[
                    InvoiceStatus::Draft,
                    InvoiceStatus::Pending,
                    InvoiceStatus::Sent,
                    InvoiceStatus::Paid,
                    InvoiceStatus::Overdue,
                ])
                .stamp("cancelled_at"),
        )
        .await
    }

    /// Complete the invoice and release its funds.
    ///
    /// When the invoice carries a release password, `password` must match
    /// it. The status change and the `invoice_transactions` row commit
    /// together.
    pub async fn release_funds(
        &self,
        owner: OwnerId,
        id: EntityId,
        password: Option<&str>,
    ) -> ApiResult<Invoice> {
        let invoice = self.find_one(owner, id).await?;
        if invoice.deleted_at.is_some() {
            return Err(Invoice::not_found(id));
        }
        if !invoice.status.can_release() {
            return Err(ValidationError::InvalidTransition {
                entity: EntityType::Invoice.to_string(),
                from: invoice.status.to_string(),
                to: InvoiceStatus::Completed.to_string(),
            }
            .into());
        }
        if let Some(digest) = &invoice.completion_password_hash {
            match password {
                Some(candidate) if verify_secret(candidate, digest) => {}
                Some(_) => return Err(ApiError::validation_failed("Invalid completion password")),
                None => return Err(ApiError::missing_field("password")),
            }
        }

        let audit = AuditEntry::new(
            "invoice_transactions",
            "invoice_id",
            super::row(json!({
                "user_id": owner,
                "transaction_type": "release",
                "amount": invoice.total_amount,
                "currency": invoice.currency,
            })),
        );
        let released = self
            .transition(
                owner,
                id,
                Transition::to(InvoiceStatus::Completed)
                    .from(RELEASABLE)
                    .stamp("completed_at")
                    .set("progress_percentage", json!(100))
                    .audit(audit),
            )
            .await?;
        tracing::info!(invoice_id = %id, owner = %owner, amount = released.total_amount, "Invoice funds released");
        Ok(released)
    }

    /// Fees due on the invoice total if it is paid in with `method`.
    pub async fn fee_quote(
        &self,
        owner: OwnerId,
        id: EntityId,
        method: PaymentMethod,
    ) -> ApiResult<EscrowFees> {
        let invoice = self.find_one(owner, id).await?;
        Ok(EscrowFees::calculate(invoice.total_amount, method))
    }

    pub async fn stats(&self, owner: OwnerId, cap: usize) -> ApiResult<InvoiceStats> {
        let window = self
            .fetch_window(owner, &InvoiceFilter::default(), cap)
            .await?;
        let rows = &window.items;

        let outstanding: Vec<&Invoice> = rows
            .iter()
            .filter(|i| !i.status.is_settled() && i.status != InvoiceStatus::Cancelled)
            .collect();
        let settled = rows.iter().filter(|i| i.status.is_settled()).count() as u64;

        Ok(InvoiceStats {
            by_status: stats::count_by(rows, "status"),
            total_billed: stats::sum(rows, "total_amount"),
            total_outstanding: outstanding.iter().map(|i| i.total_amount).sum(),
            paid_rate: stats::percentage(settled, rows.len() as u64),
            coverage: window.coverage(),
        })
    }
}
