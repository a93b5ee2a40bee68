//! Order and sale total calculation.
//!
//! Two discount conventions are in use across the portal and they are kept
//! apart on purpose: sale entry treats the discount as an amount off every
//! unit, the admin order dashboard treats it as one amount off the line.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::line_items::{ItemId, LineItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountMode {
    /// `discount * quantity` comes off the line (sale entry).
    PerUnit,
    /// `discount` comes off the line once (admin order dashboard).
    Flat,
}

impl DiscountMode {
    pub fn discount_amount(self, discount: Decimal, quantity: u32) -> Decimal {
        match self {
            DiscountMode::PerUnit => discount * Decimal::from(quantity),
            DiscountMode::Flat => discount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTotal {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub discount_amount: Decimal,
    pub gross: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderTotals {
    pub lines: Vec<LineTotal>,
    pub total_quantity: u64,
    pub total_discount: Decimal,
    pub grand_total: Decimal,
}

impl OrderTotals {
    /// `itemId -> lineTotal`. Rows sharing an id are summed.
    pub fn per_item(&self) -> BTreeMap<ItemId, Decimal> {
        let mut out: BTreeMap<ItemId, Decimal> = BTreeMap::new();
        for line in &self.lines {
            *out.entry(line.item_id.clone()).or_insert(Decimal::ZERO) += line.line_total;
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Full recompute over the given rows. Rows with zero quantity are skipped.
pub fn compute_totals(rows: &[LineItem], mode: DiscountMode) -> OrderTotals {
    let mut totals = OrderTotals::default();
    for row in rows.iter().filter(|r| r.quantity > 0) {
        let gross = row.unit_price * Decimal::from(row.quantity);
        let discount_amount = mode.discount_amount(row.discount, row.quantity);
        let line_total = gross - discount_amount;

        totals.total_quantity += u64::from(row.quantity);
        totals.total_discount += discount_amount;
        totals.grand_total += line_total;
        totals.lines.push(LineTotal {
            item_id: row.item_id.clone(),
            quantity: row.quantity,
            unit_price: row.unit_price,
            discount: row.discount,
            discount_amount,
            gross,
            line_total,
        });
    }
    totals
}
