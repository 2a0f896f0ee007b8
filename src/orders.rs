use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::StorefrontError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Paid,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(OrderStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub id: String,
    pub customer_id: String,
    pub email: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub subtotal_amount: Decimal,
    pub vat_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    /// Payment processor reference; doubles as the idempotency key used
    /// to recover from a crash between charge and persistence.
    pub payment_reference: String,
    pub reorder_schedule_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemRecord {
    pub id: String,
    pub order_id: String,
    pub product_variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub product_sku: Option<String>,
    pub price: Decimal,
    pub quantity: i64,
    pub line_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub product_sku: Option<String>,
    pub price: Decimal,
    pub quantity: i64,
    pub line_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreateOrderPayload {
    pub customer_id: String,
    pub email: String,
    pub order_number: String,
    pub subtotal_amount: Decimal,
    pub vat_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_reference: String,
    pub reorder_schedule_id: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates the order and all of its items in one transaction.
    async fn create_order(
        &self,
        payload: CreateOrderPayload,
    ) -> Result<OrderRecord, StorefrontError>;

    async fn get_order(&self, id: &str) -> Result<Option<OrderRecord>, StorefrontError>;

    async fn get_order_for_customer(
        &self,
        id: &str,
        customer_id: &str,
    ) -> Result<Option<OrderRecord>, StorefrontError>;

    /// Recovery lookup: an order already carrying this payment reference
    /// means the charge went through on a previous attempt.
    async fn get_order_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<OrderRecord>, StorefrontError>;

    async fn list_orders_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<OrderRecord>, StorefrontError>;

    async fn get_order_items(
        &self,
        order_id: &str,
    ) -> Result<Vec<OrderItemRecord>, StorefrontError>;
}

/// Order numbers look like `2026-4KX9QZ`: the year plus six random
/// uppercase alphanumerics.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    use chrono::Datelike;
    use rand::Rng;
    use rand::distr::Alphanumeric;

    let random_part: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("{}-{}", now.year(), random_part)
}
