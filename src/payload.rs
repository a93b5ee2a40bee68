//! Request and response bodies for the portal order endpoints.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::line_items::{ItemId, RowModel};
use crate::submission::SubmitError;

/// Shown when a submission has no included rows.
pub const EMPTY_ORDER_MESSAGE: &str = "Please add at least one item to your order.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItemPayload {
    pub item_id: ItemId,
    pub quantity: u32,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub discount: Option<Decimal>,
}

/// `{ items: [...], ...extra }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub items: Vec<OrderItemPayload>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Admin confirmation with adjusted quantities and discounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmOrderRequest {
    pub quantities: Vec<OrderItemPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub order_number: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub bill_id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn included_items(
    model: &RowModel,
    include_price: bool,
    include_discount: bool,
) -> Vec<OrderItemPayload> {
    model
        .line_items()
        .into_iter()
        .map(|item| OrderItemPayload {
            item_id: item.item_id,
            quantity: item.quantity,
            price: include_price.then_some(item.unit_price),
            discount: include_discount.then_some(item.discount),
        })
        .collect()
}

/// Serialise the included rows. An empty selection is rejected before any
/// network call.
pub fn build_order_request(
    model: &RowModel,
    include_price: bool,
    extra: Map<String, Value>,
) -> Result<OrderRequest, SubmitError> {
    let items = included_items(model, include_price, false);
    if items.is_empty() {
        return Err(SubmitError::Validation(EMPTY_ORDER_MESSAGE.into()));
    }
    Ok(OrderRequest { items, extra })
}

/// Quantities plus each row's discount; the server overwrites the stored
/// discount with whatever is sent, so it is always included.
pub fn build_confirm_request(model: &RowModel) -> Result<ConfirmOrderRequest, SubmitError> {
    let quantities = included_items(model, false, true);
    if quantities.is_empty() {
        return Err(SubmitError::Validation(EMPTY_ORDER_MESSAGE.into()));
    }
    Ok(ConfirmOrderRequest { quantities })
}
