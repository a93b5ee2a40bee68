//! Agency Portal - order and sale line items.
//!
//! Client-side core of the general store / milk agency portal: reading order
//! rows, computing line and grand totals, writing them back to the page, and
//! submitting orders to the portal with CSRF protection, an idempotency key
//! and a single in-flight attempt per submit control.
//!
//! Typical flow for one page:
//!
//! 1. build a [`RowModel`] from the page's rows,
//! 2. on every input event mutate the model and call [`view::recalculate`],
//! 3. on submit call a [`PortalClient`] operation and surface any
//!    [`SubmitError`] with [`view::show_error`].

pub mod config;
pub mod diagnostics;
pub mod line_items;
pub mod money;
pub mod payload;
pub mod portal;
pub mod submission;
pub mod totals;
pub mod view;
pub mod view_state;

pub use config::{load_config, read_config_file, PortalConfig};
pub use line_items::{read_row, AddItemForm, GroupKey, ItemId, LineItem, RowInput, RowModel};
pub use money::CurrencyFormat;
pub use payload::{OrderRequest, SubmitResponse};
pub use portal::PortalClient;
pub use submission::{SubmissionAdapter, SubmissionState, SubmitError};
pub use totals::{compute_totals, DiscountMode, OrderTotals};
pub use view::{MemoryView, TotalsLayout, ViewSink};
pub use view_state::{CatalogView, ViewState};
