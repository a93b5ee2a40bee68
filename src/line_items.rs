//! Line items and the typed row model behind an order or sale form.
//!
//! A page holds one row per product: an item id, a quantity input, a unit
//! price and (on sale entry) a discount input. `RowInput` is that raw form
//! state; `read_row` turns it into a `LineItem` or excludes it. `RowModel`
//! is read once from the inputs and then kept in sync with the view through
//! its own operations, so totals never re-query the page.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::money::{parse_amount, parse_quantity, round_to};
use crate::submission::SubmitError;

/// Step applied by the discount +/- controls.
const DISCOUNT_STEP: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Company/category tab a catalog row lives under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub company: String,
    pub category: String,
}

impl GroupKey {
    pub fn new(company: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            category: category.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Row reader
// ---------------------------------------------------------------------------

/// Raw state of one form row, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowInput {
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub discount: Option<String>,
    #[serde(default)]
    pub group: Option<GroupKey>,
}

/// One included product/quantity/price record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

/// Read a row; `None` when its quantity is zero, absent or malformed.
pub fn read_row(input: &RowInput) -> Option<LineItem> {
    let quantity = parse_quantity(&input.quantity);
    if quantity == 0 {
        return None;
    }
    Some(LineItem {
        item_id: ItemId::new(input.item_id.as_str()),
        quantity,
        unit_price: parse_amount(&input.price),
        discount: input
            .discount
            .as_deref()
            .map(parse_amount)
            .unwrap_or(Decimal::ZERO),
    })
}

// ---------------------------------------------------------------------------
// Row model
// ---------------------------------------------------------------------------

/// One row of the typed model, included or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub item_id: ItemId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub discount: Decimal,
    pub group: Option<GroupKey>,
}

impl Row {
    pub fn is_included(&self) -> bool {
        self.quantity > 0
    }

    fn as_line_item(&self) -> LineItem {
        LineItem {
            item_id: self.item_id.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount: self.discount,
        }
    }
}

/// The "add item to bill" mini form on sale entry.
#[derive(Debug, Clone, Default)]
pub struct AddItemForm {
    pub item_id: String,
    pub quantity: String,
    pub discount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowModel {
    rows: Vec<Row>,
}

impl RowModel {
    /// Build the model from the page's rows. Each input is read exactly once.
    pub fn from_inputs(inputs: &[RowInput]) -> Self {
        let rows = inputs
            .iter()
            .map(|input| Row {
                item_id: ItemId::new(input.item_id.as_str()),
                name: input.name.clone(),
                unit_price: parse_amount(&input.price),
                quantity: parse_quantity(&input.quantity),
                discount: input
                    .discount
                    .as_deref()
                    .map(parse_amount)
                    .unwrap_or(Decimal::ZERO),
                group: input.group.clone(),
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, item_id: &ItemId) -> Option<&Row> {
        self.rows.iter().find(|r| &r.item_id == item_id)
    }

    fn row_mut(&mut self, item_id: &ItemId) -> Result<&mut Row, String> {
        self.rows
            .iter_mut()
            .find(|r| &r.item_id == item_id)
            .ok_or_else(|| format!("Unknown item: {item_id}"))
    }

    /// Included rows (`quantity > 0`) as line items, in page order.
    pub fn line_items(&self) -> Vec<LineItem> {
        self.rows
            .iter()
            .filter(|r| r.is_included())
            .map(Row::as_line_item)
            .collect()
    }

    pub fn included_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_included()).count()
    }

    /// Typed-in quantity; malformed text reads as zero.
    pub fn set_quantity(&mut self, item_id: &ItemId, raw: &str) -> Result<u32, String> {
        let row = self.row_mut(item_id)?;
        row.quantity = parse_quantity(raw);
        Ok(row.quantity)
    }

    pub fn increment_quantity(&mut self, item_id: &ItemId) -> Result<u32, String> {
        let row = self.row_mut(item_id)?;
        row.quantity = row.quantity.saturating_add(1);
        Ok(row.quantity)
    }

    /// Decrease by one; a row already at zero is left alone.
    pub fn decrement_quantity(&mut self, item_id: &ItemId) -> Result<u32, String> {
        let row = self.row_mut(item_id)?;
        if row.quantity > 0 {
            row.quantity -= 1;
        }
        Ok(row.quantity)
    }

    pub fn set_discount(&mut self, item_id: &ItemId, raw: &str) -> Result<Decimal, String> {
        let row = self.row_mut(item_id)?;
        row.discount = parse_amount(raw);
        Ok(row.discount)
    }

    /// Add one discount step. Values below one step snap to zero first.
    pub fn increment_discount(&mut self, item_id: &ItemId) -> Result<Decimal, String> {
        let row = self.row_mut(item_id)?;
        let current = if row.discount < DISCOUNT_STEP {
            Decimal::ZERO
        } else {
            row.discount
        };
        row.discount = round_to(current + DISCOUNT_STEP, 1);
        Ok(row.discount)
    }

    /// Remove one discount step, never going below zero.
    pub fn decrement_discount(&mut self, item_id: &ItemId) -> Result<Decimal, String> {
        let row = self.row_mut(item_id)?;
        row.discount = round_to((row.discount - DISCOUNT_STEP).max(Decimal::ZERO), 1);
        Ok(row.discount)
    }

    /// Apply the add-item form: overwrites quantity and discount of the
    /// selected row.
    pub fn add_item(&mut self, form: &AddItemForm) -> Result<(), SubmitError> {
        let item_id = ItemId::new(form.item_id.as_str());
        let quantity = parse_quantity(&form.quantity);
        if item_id.is_empty() || quantity == 0 {
            return Err(SubmitError::Validation(
                "Please select a product and enter a valid quantity.".into(),
            ));
        }
        let discount = parse_amount(&form.discount);
        let row = self.row_mut(&item_id).map_err(SubmitError::Validation)?;
        row.quantity = quantity;
        row.discount = discount;
        debug!(item_id = %item_id, quantity, "item added to bill");
        Ok(())
    }

    /// Drop a row from the bill by zeroing its quantity and discount.
    pub fn remove_item(&mut self, item_id: &ItemId) -> Result<(), String> {
        let row = self.row_mut(item_id)?;
        row.quantity = 0;
        row.discount = Decimal::ZERO;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(id: &str, qty: &str, price: &str, discount: Option<&str>) -> RowInput {
        RowInput {
            item_id: id.to_string(),
            name: format!("Item {id}"),
            quantity: qty.to_string(),
            price: price.to_string(),
            discount: discount.map(str::to_string),
            group: None,
        }
    }

    fn sample_model() -> RowModel {
        RowModel::from_inputs(&[
            input("1", "2", "50", Some("5")),
            input("2", "0", "30", Some("0")),
            input("3", "", "12.50", None),
        ])
    }

    #[test]
    fn test_read_row_excludes_zero_and_malformed_quantity() {
        assert!(read_row(&input("1", "0", "10", None)).is_none());
        assert!(read_row(&input("1", "", "10", None)).is_none());
        assert!(read_row(&input("1", "lots", "10", None)).is_none());
    }

    #[test]
    fn test_read_row_parses_fields() {
        let item = read_row(&input(" 7 ", "3", "20.5", Some("1.5"))).expect("row included");
        assert_eq!(item.item_id.as_str(), "7");
        assert_eq!(item.quantity, 3);
        assert_eq!(item.unit_price, dec!(20.5));
        assert_eq!(item.discount, dec!(1.5));

        let no_discount = read_row(&input("8", "1", "abc", None)).expect("row included");
        assert_eq!(no_discount.unit_price, Decimal::ZERO);
        assert_eq!(no_discount.discount, Decimal::ZERO);
    }

    #[test]
    fn test_line_items_only_included_rows() {
        let model = sample_model();
        let items = model.line_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_id.as_str(), "1");
        assert_eq!(model.included_count(), 1);
        assert_eq!(model.rows().len(), 3);
    }

    #[test]
    fn test_quantity_controls() {
        let mut model = sample_model();
        let id = ItemId::from("2");
        assert_eq!(model.decrement_quantity(&id).unwrap(), 0);
        assert_eq!(model.increment_quantity(&id).unwrap(), 1);
        assert_eq!(model.increment_quantity(&id).unwrap(), 2);
        assert_eq!(model.decrement_quantity(&id).unwrap(), 1);
        assert_eq!(model.set_quantity(&id, "x").unwrap(), 0);
        assert!(model.increment_quantity(&ItemId::from("404")).is_err());
    }

    #[test]
    fn test_discount_controls() {
        let mut model = sample_model();
        let id = ItemId::from("3");
        assert_eq!(model.increment_discount(&id).unwrap(), dec!(0.1));
        assert_eq!(model.increment_discount(&id).unwrap(), dec!(0.2));
        assert_eq!(model.decrement_discount(&id).unwrap(), dec!(0.1));
        assert_eq!(model.decrement_discount(&id).unwrap(), dec!(0.0));
        assert_eq!(model.decrement_discount(&id).unwrap(), dec!(0.0));

        model.set_discount(&id, "0.05").unwrap();
        assert_eq!(model.increment_discount(&id).unwrap(), dec!(0.1));
    }

    #[test]
    fn test_add_item_overwrites_row() {
        let mut model = sample_model();
        model
            .add_item(&AddItemForm {
                item_id: "3".into(),
                quantity: "4".into(),
                discount: "0.5".into(),
            })
            .expect("add item");
        let row = model.row(&ItemId::from("3")).unwrap();
        assert_eq!(row.quantity, 4);
        assert_eq!(row.discount, dec!(0.5));
        assert_eq!(model.included_count(), 2);
    }

    #[test]
    fn test_add_item_rejects_missing_product_or_quantity() {
        let mut model = sample_model();
        let err = model
            .add_item(&AddItemForm {
                item_id: "".into(),
                quantity: "2".into(),
                discount: "".into(),
            })
            .expect_err("empty product should be rejected");
        assert!(matches!(err, SubmitError::Validation(ref m) if m.contains("select a product")));

        assert!(model
            .add_item(&AddItemForm {
                item_id: "1".into(),
                quantity: "0".into(),
                discount: "".into(),
            })
            .is_err());
        let err = model
            .add_item(&AddItemForm {
                item_id: "999".into(),
                quantity: "1".into(),
                discount: "".into(),
            })
            .expect_err("unknown product should be rejected");
        assert_eq!(err, SubmitError::Validation("Unknown item: 999".into()));
    }

    #[test]
    fn test_remove_item_zeroes_row() {
        let mut model = sample_model();
        let id = ItemId::from("1");
        model.remove_item(&id).unwrap();
        let row = model.row(&id).unwrap();
        assert_eq!(row.quantity, 0);
        assert_eq!(row.discount, Decimal::ZERO);
        assert!(model.line_items().is_empty());
    }
}
