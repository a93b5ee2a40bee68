//! Portal connection settings.
//!
//! Loaded from a JSON file, then overridden from the environment:
//! `PORTAL_BASE_URL`, `PORTAL_CSRF_TOKEN`, `PORTAL_TIMEOUT_SECS`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::money::{CurrencyFormat, DEFAULT_CURRENCY_GLYPH};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Placeholder substituted with the order id in endpoint templates.
pub const ORDER_ID_PLACEHOLDER: &str = "{order_id}";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalConfig {
    pub base_url: String,
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default = "default_glyph")]
    pub currency_glyph: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub customer_orders: String,
    pub confirm_order: String,
    pub reject_order: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            customer_orders: "/customer/orders/".into(),
            confirm_order: "/milk_agency/confirm-order/{order_id}/".into(),
            reject_order: "/milk_agency/reject-order/{order_id}/".into(),
        }
    }
}

fn default_glyph() -> String {
    DEFAULT_CURRENCY_GLYPH.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = if self.csrf_token.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("PortalConfig")
            .field("base_url", &self.base_url)
            .field("csrf_token", &token)
            .field("currency_glyph", &self.currency_glyph)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("log_dir", &self.log_dir)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl PortalConfig {
    pub fn new(base_url: &str, csrf_token: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            csrf_token: csrf_token.to_string(),
            currency_glyph: default_glyph(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_dir: None,
            endpoints: Endpoints::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn currency(&self) -> CurrencyFormat {
        CurrencyFormat::new(self.currency_glyph.clone())
    }

    /// Absolute URL for an endpoint path or template.
    pub fn url_for(&self, path: &str, order_id: Option<&str>) -> Result<String, String> {
        let path = path.trim();
        if path.starts_with("http://") || path.starts_with("https://") {
            return Err("Endpoint paths must be relative to base_url".into());
        }
        if !path.starts_with('/') || path.contains("..") {
            return Err(format!("Invalid endpoint path: {path}"));
        }
        let resolved = match (path.contains(ORDER_ID_PLACEHOLDER), order_id) {
            (true, Some(id)) => {
                let id = id.trim();
                if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    return Err(format!("Invalid order id: {id}"));
                }
                path.replace(ORDER_ID_PLACEHOLDER, id)
            }
            (true, None) => return Err(format!("Endpoint {path} needs an order id")),
            (false, _) => path.to_string(),
        };
        Ok(format!("{}{}", self.base_url, resolved))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url is required".into());
        }
        if self.csrf_token.trim().is_empty() {
            return Err("csrf_token is required".into());
        }
        Ok(())
    }

    /// Apply `PORTAL_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PORTAL_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = normalize_base_url(&url);
        }
        if let Some(token) = lookup("PORTAL_CSRF_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.csrf_token = token.trim().to_string();
        }
        if let Some(secs) = lookup("PORTAL_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.request_timeout_secs = secs;
        }
    }
}

/// Normalise the portal base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Parse a config file as written, without environment overrides.
pub fn read_config_file(path: &Path) -> Result<PortalConfig, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("read config {}: {e}", path.display()))?;
    let mut config: PortalConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("parse config {}: {e}", path.display()))?;
    config.base_url = normalize_base_url(&config.base_url);
    Ok(config)
}

/// Read a config file and apply environment overrides.
pub fn load_config(path: &Path) -> Result<PortalConfig, String> {
    let mut config = read_config_file(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
