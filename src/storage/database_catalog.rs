use async_trait::async_trait;
use rusqlite::OptionalExtension;

use crate::catalog::{CatalogStore, ProductVariantRecord};
use crate::error::StorefrontError;
use crate::storage::database::{Database, parse_money};

fn row_to_variant(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(String, String, String, String, String, Option<String>, bool)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn build_variant(
    (id, product_name, variant_name, sku, price_s, pack_size, active): (
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        bool,
    ),
) -> Result<ProductVariantRecord, StorefrontError> {
    Ok(ProductVariantRecord {
        id,
        product_name,
        variant_name,
        sku,
        price: parse_money(&price_s)?,
        pack_size,
        active,
    })
}

#[async_trait]
impl CatalogStore for Database {
    async fn get_variant(
        &self,
        id: &str,
    ) -> Result<Option<ProductVariantRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                "SELECT id, product_name, variant_name, sku, price, pack_size, active
                 FROM product_variants WHERE id = ?1",
                [id],
                row_to_variant,
            )
            .optional()?;
        row.map(build_variant).transpose()
    }

    async fn upsert_variant(
        &self,
        variant: &ProductVariantRecord,
    ) -> Result<(), StorefrontError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO product_variants (id, product_name, variant_name, sku, price, pack_size, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                 product_name = excluded.product_name,
                 variant_name = excluded.variant_name,
                 sku = excluded.sku,
                 price = excluded.price,
                 pack_size = excluded.pack_size,
                 active = excluded.active",
            rusqlite::params![
                variant.id,
                variant.product_name,
                variant.variant_name,
                variant.sku,
                variant.price.to_string(),
                variant.pack_size,
                variant.active,
            ],
        )?;
        Ok(())
    }
}
