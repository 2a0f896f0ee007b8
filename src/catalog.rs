use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StorefrontError;

/// The slice of the product catalog the reorder engine reads: current
/// price and orderability per variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariantRecord {
    pub id: String,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub price: Decimal,
    #[serde(default)]
    pub pack_size: Option<String>,
    pub active: bool,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_variant(
        &self,
        id: &str,
    ) -> Result<Option<ProductVariantRecord>, StorefrontError>;

    /// Insert-or-update, used by seeding and admin tooling.
    async fn upsert_variant(
        &self,
        variant: &ProductVariantRecord,
    ) -> Result<(), StorefrontError>;
}
