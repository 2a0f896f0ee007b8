use rust_decimal::{Decimal, RoundingStrategy};

use crate::catalog::{CatalogStore, ProductVariantRecord};
use crate::config::settings::CheckoutConfig;
use crate::error::{Result as AppResult, StorefrontError};
use crate::pending_orders::{ItemsSnapshot, SnapshotItem, UnavailableItem};
use crate::schedule::ScheduleItemRecord;

/// One requested line of an edit: the variant and the quantity the
/// customer wants. Validation happens in `rebuild_snapshot`.
#[derive(Debug, Clone)]
pub struct ItemEdit {
    pub product_variant_id: String,
    pub quantity: i64,
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn snapshot_line(variant: &ProductVariantRecord, quantity: i64) -> SnapshotItem {
    let price = round_money(variant.price);
    SnapshotItem {
        product_variant_id: variant.id.clone(),
        product_name: variant.product_name.clone(),
        variant_name: variant.variant_name.clone(),
        quantity,
        price,
        line_total: round_money(price * Decimal::from(quantity)),
        available: true,
    }
}

fn unavailable_line(
    variant_id: &str,
    variant: Option<&ProductVariantRecord>,
) -> UnavailableItem {
    match variant {
        Some(v) => UnavailableItem {
            product_variant_id: Some(v.id.clone()),
            product_name: v.product_name.clone(),
            variant_name: v.variant_name.clone(),
            reason: "Product is no longer available".to_string(),
        },
        None => UnavailableItem {
            product_variant_id: Some(variant_id.to_string()),
            product_name: "Unknown product".to_string(),
            variant_name: "Unknown".to_string(),
            reason: "Product variant no longer exists".to_string(),
        },
    }
}

fn totalize(
    items: Vec<SnapshotItem>,
    unavailable_items: Vec<UnavailableItem>,
    checkout: &CheckoutConfig,
) -> ItemsSnapshot {
    let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();
    let subtotal = round_money(subtotal);
    let vat = round_money(subtotal * checkout.vat_rate);
    let shipping = if items.is_empty() || subtotal >= checkout.free_shipping_threshold {
        Decimal::ZERO
    } else {
        round_money(checkout.standard_shipping)
    };
    let total = round_money(subtotal + vat + shipping);

    ItemsSnapshot {
        items,
        subtotal,
        vat,
        shipping,
        total,
        unavailable_items,
    }
}

/// Prices a schedule's items into a fresh snapshot using the catalog's
/// current prices and availability. Inactive or vanished variants land in
/// `unavailable_items` so the customer sees why a line is missing.
pub async fn build_snapshot(
    items: &[ScheduleItemRecord],
    catalog: &dyn CatalogStore,
    checkout: &CheckoutConfig,
) -> AppResult<ItemsSnapshot> {
    let mut available = Vec::new();
    let mut unavailable = Vec::new();

    for item in items {
        let variant = catalog.get_variant(&item.product_variant_id).await?;
        match variant {
            Some(ref v) if v.active => available.push(snapshot_line(v, item.quantity)),
            other => unavailable.push(unavailable_line(
                &item.product_variant_id,
                other.as_ref(),
            )),
        }
    }

    Ok(totalize(available, unavailable, checkout))
}

/// Rebuilds a pending order's snapshot from an edit. Rejects an empty edit
/// and any non-positive quantity before touching the catalog; surviving
/// lines are re-priced from the live catalog, and lines whose product has
/// since gone are kept visible as unavailable rather than dropped.
pub async fn rebuild_snapshot(
    edits: &[ItemEdit],
    catalog: &dyn CatalogStore,
    checkout: &CheckoutConfig,
) -> AppResult<ItemsSnapshot> {
    if edits.is_empty() {
        return Err(StorefrontError::Validation(
            "cannot save an empty order".to_string(),
        ));
    }
    if edits.iter().any(|e| e.quantity <= 0) {
        return Err(StorefrontError::Validation(
            "quantity must be greater than zero".to_string(),
        ));
    }

    let mut available = Vec::new();
    let mut unavailable = Vec::new();

    for edit in edits {
        let variant = catalog.get_variant(&edit.product_variant_id).await?;
        match variant {
            Some(ref v) if v.active => available.push(snapshot_line(v, edit.quantity)),
            other => unavailable.push(unavailable_line(
                &edit.product_variant_id,
                other.as_ref(),
            )),
        }
    }

    Ok(totalize(available, unavailable, checkout))
}
