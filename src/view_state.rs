//! Catalog tabs and the quantities they keep across tab switches.
//!
//! The customer order page splits its catalog into company and category
//! tabs. Quantities typed on one tab must survive switching away and back.
//! `ViewState` belongs to one page instance and is passed explicitly to
//! `save` and `restore`.

use std::collections::BTreeMap;

use crate::line_items::{GroupKey, ItemId, LineItem, RowInput, RowModel};

/// All tabs of one catalog page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogView {
    groups: BTreeMap<GroupKey, RowModel>,
}

impl CatalogView {
    /// Split rows by their group. Rows without a group land under an empty
    /// company/category key.
    pub fn from_inputs(inputs: &[RowInput]) -> Self {
        let mut by_group: BTreeMap<GroupKey, Vec<RowInput>> = BTreeMap::new();
        for input in inputs {
            let key = input
                .group
                .clone()
                .unwrap_or_else(|| GroupKey::new("", ""));
            by_group.entry(key).or_default().push(input.clone());
        }
        let groups = by_group
            .into_iter()
            .map(|(key, rows)| (key, RowModel::from_inputs(&rows)))
            .collect();
        Self { groups }
    }

    pub fn group(&self, key: &GroupKey) -> Option<&RowModel> {
        self.groups.get(key)
    }

    pub fn group_mut(&mut self, key: &GroupKey) -> Option<&mut RowModel> {
        self.groups.get_mut(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &RowModel)> {
        self.groups.iter()
    }

    /// Included rows across every tab, in tab order.
    pub fn line_items(&self) -> Vec<LineItem> {
        self.groups.values().flat_map(RowModel::line_items).collect()
    }

    /// Flatten into a single model for totals and submission.
    pub fn to_row_model(&self) -> RowModel {
        let inputs: Vec<RowInput> = self
            .groups
            .iter()
            .flat_map(|(key, model)| {
                model.rows().iter().map(move |row| RowInput {
                    item_id: row.item_id.to_string(),
                    name: row.name.clone(),
                    quantity: row.quantity.to_string(),
                    price: row.unit_price.to_string(),
                    discount: Some(row.discount.to_string()),
                    group: Some(key.clone()),
                })
            })
            .collect();
        RowModel::from_inputs(&inputs)
    }
}

/// Saved quantities, per tab, for one page instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    saved: BTreeMap<GroupKey, Vec<(ItemId, u32)>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Replace the snapshot with the current quantity of every row.
    pub fn save(&mut self, view: &CatalogView) {
        self.saved = view
            .groups()
            .map(|(key, model)| {
                let rows = model
                    .rows()
                    .iter()
                    .map(|row| (row.item_id.clone(), row.quantity))
                    .collect();
                (key.clone(), rows)
            })
            .collect();
    }

    /// Write saved quantities back. Tabs or items that no longer exist are
    /// skipped. Returns how many rows were restored.
    pub fn restore(&self, view: &mut CatalogView) -> usize {
        let mut restored = 0;
        for (key, items) in &self.saved {
            let Some(model) = view.group_mut(key) else {
                continue;
            };
            for (item_id, quantity) in items {
                if model.set_quantity(item_id, &quantity.to_string()).is_ok() {
                    restored += 1;
                }
            }
        }
        restored
    }

    pub fn saved_quantity(&self, key: &GroupKey, item_id: &ItemId) -> Option<u32> {
        self.saved
            .get(key)?
            .iter()
            .find(|(id, _)| id == item_id)
            .map(|(_, qty)| *qty)
    }
}
