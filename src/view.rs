//! Writing computed totals back to the page.
//!
//! The page is abstracted as a `ViewSink`: text nodes addressed by id, form
//! fields addressed by name, and tables whose body can be replaced. Nothing
//! here reads from the sink.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::line_items::RowModel;
use crate::money::{format_discount, plain, CurrencyFormat};
use crate::submission::SubmitError;
use crate::totals::{compute_totals, DiscountMode, OrderTotals};

/// Summary text shown when nothing is selected.
pub const EMPTY_SUMMARY: &str = "No items selected";

pub trait ViewSink {
    fn set_text(&mut self, node: &str, text: &str);
    fn set_value(&mut self, field: &str, value: &str);
    fn replace_rows(&mut self, table: &str, rows: Vec<Vec<String>>);
}

/// Where each computed value goes.
///
/// Per-row nodes and fields are addressed as `{prefix}{item_id}`.
#[derive(Debug, Clone, Default)]
pub struct TotalsLayout {
    pub grand_total_node: String,
    pub total_quantity_node: Option<String>,
    pub total_discount_node: Option<String>,
    pub grand_total_field: Option<String>,
    pub summary_node: Option<String>,
    pub line_total_prefix: Option<String>,
    pub quantity_field_prefix: Option<String>,
    pub discount_field_prefix: Option<String>,
    pub billed_items_table: Option<String>,
}

impl TotalsLayout {
    /// Sale entry page: footer totals, hidden per-item fields, billed table.
    pub fn sale_entry() -> Self {
        Self {
            grand_total_node: "total-amt".into(),
            total_quantity_node: Some("total-qty".into()),
            total_discount_node: Some("total-disc-amt".into()),
            grand_total_field: Some("total-amount".into()),
            summary_node: None,
            line_total_prefix: None,
            quantity_field_prefix: Some("quantity-hidden-".into()),
            discount_field_prefix: Some("discount-hidden-".into()),
            billed_items_table: Some("billed-items-body".into()),
        }
    }

    /// Customer order page: per-card totals plus an order summary.
    pub fn customer_order() -> Self {
        Self {
            grand_total_node: "totalAmount".into(),
            summary_node: Some("orderSummary".into()),
            line_total_prefix: Some("total-amount-".into()),
            ..Self::default()
        }
    }

    /// Admin order card: per-line totals and the card's total amount.
    pub fn admin_order(order_id: &str) -> Self {
        Self {
            grand_total_node: format!("order-{order_id}-total"),
            line_total_prefix: Some(format!("order-{order_id}-item-total-")),
            ..Self::default()
        }
    }
}

/// Write totals for every row in the model. Excluded rows show a zero line
/// total and a zero hidden quantity.
pub fn write_totals(
    sink: &mut dyn ViewSink,
    layout: &TotalsLayout,
    model: &RowModel,
    totals: &OrderTotals,
    currency: &CurrencyFormat,
) {
    let per_item = totals.per_item();

    for row in model.rows() {
        let id = row.item_id.as_str();
        let line_total = per_item
            .get(&row.item_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if let Some(prefix) = &layout.line_total_prefix {
            sink.set_text(&format!("{prefix}{id}"), &currency.format(line_total));
        }
        if let Some(prefix) = &layout.quantity_field_prefix {
            sink.set_value(&format!("{prefix}{id}"), &row.quantity.to_string());
        }
        if let Some(prefix) = &layout.discount_field_prefix {
            let discount = if row.is_included() {
                row.discount
            } else {
                Decimal::ZERO
            };
            sink.set_value(&format!("{prefix}{id}"), &discount.normalize().to_string());
        }
    }

    if let Some(table) = &layout.billed_items_table {
        sink.replace_rows(table, billed_rows(model, totals, currency));
    }

    sink.set_text(&layout.grand_total_node, &currency.format(totals.grand_total));
    if let Some(node) = &layout.total_quantity_node {
        sink.set_text(node, &totals.total_quantity.to_string());
    }
    if let Some(node) = &layout.total_discount_node {
        sink.set_text(node, &currency.format(totals.total_discount));
    }
    if let Some(field) = &layout.grand_total_field {
        sink.set_value(field, &plain(totals.grand_total));
    }
    if let Some(node) = &layout.summary_node {
        let text = if totals.grand_total > Decimal::ZERO {
            format!("Total: {}", currency.format(totals.grand_total))
        } else {
            EMPTY_SUMMARY.to_string()
        };
        sink.set_text(node, &text);
    }
}

/// One input event: recompute from the model and write everything out.
pub fn recalculate(
    sink: &mut dyn ViewSink,
    layout: &TotalsLayout,
    model: &RowModel,
    mode: DiscountMode,
    currency: &CurrencyFormat,
) -> OrderTotals {
    let totals = compute_totals(&model.line_items(), mode);
    debug!(
        rows = model.rows().len(),
        included = totals.lines.len(),
        grand_total = %totals.grand_total,
        "totals recalculated"
    );
    write_totals(sink, layout, model, &totals, currency);
    totals
}

/// Billed-items table body: name, unit price, quantity, discount, discount
/// amount, line total.
pub fn billed_rows(
    model: &RowModel,
    totals: &OrderTotals,
    currency: &CurrencyFormat,
) -> Vec<Vec<String>> {
    totals
        .lines
        .iter()
        .map(|line| {
            let name = model
                .row(&line.item_id)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| line.item_id.to_string());
            vec![
                name,
                currency.format(line.unit_price),
                line.quantity.to_string(),
                format_discount(line.discount),
                currency.format(line.discount_amount),
                currency.format(line.line_total),
            ]
        })
        .collect()
}

/// Surface a failed attempt. This is the only write made on failure.
pub fn show_error(sink: &mut dyn ViewSink, node: &str, error: &SubmitError) {
    sink.set_text(node, &error.user_message());
}

// ---------------------------------------------------------------------------
// In-memory sink
// ---------------------------------------------------------------------------

/// `ViewSink` that records the latest write to every node, field and table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryView {
    pub texts: BTreeMap<String, String>,
    pub values: BTreeMap<String, String>,
    pub tables: BTreeMap<String, Vec<Vec<String>>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self, node: &str) -> Option<&str> {
        self.texts.get(node).map(String::as_str)
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn table(&self, table: &str) -> Option<&[Vec<String>]> {
        self.tables.get(table).map(Vec::as_slice)
    }
}

impl ViewSink for MemoryView {
    fn set_text(&mut self, node: &str, text: &str) {
        self.texts.insert(node.to_string(), text.to_string());
    }

    fn set_value(&mut self, field: &str, value: &str) {
        self.values.insert(field.to_string(), value.to_string());
    }

    fn replace_rows(&mut self, table: &str, rows: Vec<Vec<String>>) {
        self.tables.insert(table.to_string(), rows);
    }
}
