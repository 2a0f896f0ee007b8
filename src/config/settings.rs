use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub reorder: ReorderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/storefront.db".to_string(),
        }
    }
}

/// Money rules applied when a pending order snapshot is priced.
/// Decimal fields are written as strings in the TOML file, e.g. `vat_rate = "0.20"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    pub vat_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    pub standard_shipping: Decimal,
    pub currency: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            vat_rate: Decimal::new(20, 2),
            free_shipping_threshold: Decimal::new(100_00, 2),
            standard_shipping: Decimal::new(6_99, 2),
            currency: "gbp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderConfig {
    /// Days before the scheduled delivery date that a pending order is
    /// created and the reminder email goes out.
    pub lead_days: i64,
    /// Days past `scheduled_for` after which an unconfirmed pending order
    /// is expired by the sweep.
    pub expiry_days: i64,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            lead_days: 3,
            expiry_days: 7,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let Some(config_path) = Self::find_config_file() else {
            tracing::warn!("no storefront.toml or config.toml found; using defaults");
            return Ok(Settings::default());
        };
        let config_content = std::fs::read_to_string(&config_path)?;
        let settings: Settings = toml::from_str(&config_content)?;
        Ok(settings)
    }

    fn find_config_file() -> Option<String> {
        let possible_names = ["storefront.toml", "config.toml"];

        possible_names
            .iter()
            .find(|name| Path::new(name).exists())
            .map(|name| name.to_string())
    }
}
