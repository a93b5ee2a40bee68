//! Portal order operations.
//!
//! Binds the submission adapter to the three order endpoints the portal
//! pages post to: the customer placing an order, and an admin confirming or
//! rejecting it. Adapters are cached per resolved URL so that repeated
//! triggers for the same order hit the same in-flight guard.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::config::PortalConfig;
use crate::line_items::RowModel;
use crate::money::CurrencyFormat;
use crate::payload::{build_confirm_request, build_order_request, SubmitResponse};
use crate::submission::{SubmissionAdapter, SubmitError};

pub struct PortalClient {
    config: PortalConfig,
    adapters: Mutex<HashMap<String, Arc<SubmissionAdapter>>>,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self, String> {
        config.validate()?;
        Ok(Self {
            config,
            adapters: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn currency(&self) -> CurrencyFormat {
        self.config.currency()
    }

    /// Adapter for an endpoint path, created on first use.
    pub fn adapter_for(
        &self,
        path: &str,
        order_id: Option<&str>,
    ) -> Result<Arc<SubmissionAdapter>, SubmitError> {
        let url = self
            .config
            .url_for(path, order_id)
            .map_err(SubmitError::Validation)?;
        let mut adapters = self.adapters.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(adapter) = adapters.get(&url) {
            return Ok(adapter.clone());
        }
        let adapter = Arc::new(
            SubmissionAdapter::new(
                url.clone(),
                self.config.csrf_token.clone(),
                self.config.timeout(),
            )
            .map_err(SubmitError::Transport)?,
        );
        adapters.insert(url, adapter.clone());
        Ok(adapter)
    }

    /// Customer places an order from the catalog page.
    ///
    /// Notes are always sent, empty when the customer left none.
    pub async fn place_customer_order(
        &self,
        model: &RowModel,
        notes: Option<&str>,
    ) -> Result<SubmitResponse, SubmitError> {
        let mut extra = Map::new();
        extra.insert(
            "additional_notes".into(),
            Value::String(notes.unwrap_or_default().trim().to_string()),
        );
        let request = build_order_request(model, true, extra)?;
        let adapter = self.adapter_for(&self.config.endpoints.customer_orders, None)?;
        let response = adapter.submit(&request).await?;
        info!(
            items = request.items.len(),
            order_number = response.order_number.as_deref().unwrap_or(""),
            "customer order placed"
        );
        Ok(response)
    }

    /// Admin confirms an order with the quantities and discounts currently on
    /// its card.
    ///
    /// Rows set to zero are not sent, and the server keeps billing those
    /// items at the quantity the customer originally requested.
    pub async fn confirm_order(
        &self,
        order_id: &str,
        model: &RowModel,
    ) -> Result<SubmitResponse, SubmitError> {
        let request = build_confirm_request(model)?;
        let adapter = self.adapter_for(&self.config.endpoints.confirm_order, Some(order_id))?;
        let response = adapter.submit(&request).await?;
        info!(
            order_id,
            bill_id = response.bill_id.as_deref().unwrap_or(""),
            "order confirmed"
        );
        Ok(response)
    }

    pub async fn reject_order(&self, order_id: &str) -> Result<SubmitResponse, SubmitError> {
        let adapter = self.adapter_for(&self.config.endpoints.reject_order, Some(order_id))?;
        let response = adapter.submit(&json!({})).await?;
        info!(order_id, "order rejected");
        Ok(response)
    }
}
