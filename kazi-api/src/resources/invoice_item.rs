//! Invoice line items, owned through their invoice.

use kazi_core::{EntityId, EntityType, NoStatus, OwnerId, Record, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiResult;
use crate::resource::{Ownership, Resource};
use crate::validation::{HasUpdates, ValidateNonEmpty, ValidateRange};
use kazi_core::SortDirection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InvoiceItem {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub invoice_id: EntityId,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub amount: f64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateInvoiceItem {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub invoice_id: EntityId,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateInvoiceItem {
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
}

impl HasUpdates for UpdateInvoiceItem {
    fn has_any_updates(&self) -> bool {
        self.description.is_some() || self.quantity.is_some() || self.unit_price.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceItemFilter {
    pub invoice_id: Option<EntityId>,
}

crate::impl_list_filter!(InvoiceItemFilter { invoice_id });

impl Resource for InvoiceItem {
    type Create = CreateInvoiceItem;
    type Update = UpdateInvoiceItem;
    type Filter = InvoiceItemFilter;
    type Status = NoStatus;

    const TABLE: &'static str = "invoice_items";
    const ENTITY: EntityType = EntityType::InvoiceItem;
    const OWNERSHIP: Ownership = Ownership::Parent {
        column: "invoice_id",
        parent_table: "invoices",
        parent_owner: "user_id",
    };
    const DEFAULT_LIMIT: usize = 100;
    const ORDER_BY: (&'static str, SortDirection) = ("created_at", SortDirection::Asc);

    fn id(&self) -> EntityId {
        self.id
    }

    fn validate_create(_owner: OwnerId, input: &CreateInvoiceItem) -> ApiResult<()> {
        input.description.validate_non_empty("description")?;
        input.quantity.validate_non_negative("quantity")?;
        input.unit_price.validate_non_negative("unit_price")
    }

    fn validate_update(input: &UpdateInvoiceItem) -> ApiResult<()> {
        input.validate_has_updates()?;
        input.description.validate_non_empty("description")?;
        if let Some(quantity) = input.quantity {
            quantity.validate_non_negative("quantity")?;
        }
        if let Some(price) = input.unit_price {
            price.validate_non_negative("unit_price")?;
        }
        Ok(())
    }

    /// `amount` is always `quantity * unit_price`.
    fn input_columns(input: &CreateInvoiceItem) -> ApiResult<Record> {
        Ok(super::row(json!({
            "invoice_id": input.invoice_id,
            "description": input.description,
            "quantity": input.quantity,
            "unit_price": input.unit_price,
            "amount": input.quantity * input.unit_price,
        })))
    }

    fn derive_update(current: &Record, patch: &mut Record) {
        if !patch.contains_key("quantity") && !patch.contains_key("unit_price") {
            return;
        }
        let read = |column: &str| {
            patch
                .get(column)
                .or_else(|| current.get(column))
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0)
        };
        let amount = read("quantity") * read("unit_price");
        patch.insert("amount".to_string(), json!(amount));
    }
}
