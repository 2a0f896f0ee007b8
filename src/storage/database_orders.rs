use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::error::StorefrontError;
use crate::orders::{CreateOrderPayload, OrderItemRecord, OrderRecord, OrderStatus, OrderStore};
use crate::storage::database::{Database, parse_money};
use crate::storage::time::{parse_utc_string, to_utc_string};

type OrderRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
);

const ORDER_COLUMNS: &str = "id, customer_id, email, order_number, status, subtotal_amount, \
     vat_amount, shipping_amount, total_amount, payment_reference, reorder_schedule_id, created_at";

fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn build_order(row: OrderRow) -> Result<OrderRecord, StorefrontError> {
    let (
        id,
        customer_id,
        email,
        order_number,
        status_s,
        subtotal_s,
        vat_s,
        shipping_s,
        total_s,
        payment_reference,
        reorder_schedule_id,
        created_at_s,
    ) = row;
    let status = OrderStatus::parse(&status_s)
        .ok_or_else(|| StorefrontError::Data(format!("unknown order status `{}`", status_s)))?;
    Ok(OrderRecord {
        id,
        customer_id,
        email,
        order_number,
        status,
        subtotal_amount: parse_money(&subtotal_s)?,
        vat_amount: parse_money(&vat_s)?,
        shipping_amount: parse_money(&shipping_s)?,
        total_amount: parse_money(&total_s)?,
        payment_reference,
        reorder_schedule_id,
        created_at: parse_utc_string(&created_at_s)?,
    })
}

#[async_trait]
impl OrderStore for Database {
    async fn create_order(
        &self,
        payload: CreateOrderPayload,
    ) -> Result<OrderRecord, StorefrontError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();

        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO orders (id, customer_id, email, order_number, status, subtotal_amount, \
                 vat_amount, shipping_amount, total_amount, payment_reference, \
                 reorder_schedule_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                order_id,
                payload.customer_id,
                payload.email,
                payload.order_number,
                OrderStatus::Paid.as_str(),
                payload.subtotal_amount.to_string(),
                payload.vat_amount.to_string(),
                payload.shipping_amount.to_string(),
                payload.total_amount.to_string(),
                payload.payment_reference,
                payload.reorder_schedule_id,
                to_utc_string(&now),
            ],
        )?;
        for item in &payload.items {
            tx.execute(
                "INSERT INTO order_items (id, order_id, product_variant_id, product_name, \
                     variant_name, product_sku, price, quantity, line_total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    order_id,
                    item.product_variant_id,
                    item.product_name,
                    item.variant_name,
                    item.product_sku,
                    item.price.to_string(),
                    item.quantity,
                    item.line_total.to_string(),
                ],
            )?;
        }
        tx.commit()?;

        Ok(OrderRecord {
            id: order_id,
            customer_id: payload.customer_id,
            email: payload.email,
            order_number: payload.order_number,
            status: OrderStatus::Paid,
            subtotal_amount: payload.subtotal_amount,
            vat_amount: payload.vat_amount,
            shipping_amount: payload.shipping_amount,
            total_amount: payload.total_amount,
            payment_reference: payload.payment_reference,
            reorder_schedule_id: payload.reorder_schedule_id,
            created_at: now,
        })
    }

    async fn get_order(&self, id: &str) -> Result<Option<OrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS),
                [id],
                row_to_order,
            )
            .optional()?;
        row.map(build_order).transpose()
    }

    async fn get_order_for_customer(
        &self,
        id: &str,
        customer_id: &str,
    ) -> Result<Option<OrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM orders WHERE id = ?1 AND customer_id = ?2",
                    ORDER_COLUMNS
                ),
                rusqlite::params![id, customer_id],
                row_to_order,
            )
            .optional()?;
        row.map(build_order).transpose()
    }

    async fn get_order_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<OrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM orders WHERE payment_reference = ?1",
                    ORDER_COLUMNS
                ),
                [payment_reference],
                row_to_order,
            )
            .optional()?;
        row.map(build_order).transpose()
    }

    async fn list_orders_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<OrderRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM orders WHERE customer_id = ?1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))?;
        let rows = stmt
            .query_map([customer_id], row_to_order)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(build_order).collect()
    }

    async fn get_order_items(
        &self,
        order_id: &str,
    ) -> Result<Vec<OrderItemRecord>, StorefrontError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, order_id, product_variant_id, product_name, variant_name, product_sku, \
                 price, quantity, line_total
             FROM order_items WHERE order_id = ?1 ORDER BY rowid",
        )?;
        let rows: Vec<(
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            String,
            i64,
            String,
        )> = stmt
            .query_map([order_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(
                    id,
                    order_id,
                    product_variant_id,
                    product_name,
                    variant_name,
                    product_sku,
                    price_s,
                    quantity,
                    line_total_s,
                )| {
                    Ok(OrderItemRecord {
                        id,
                        order_id,
                        product_variant_id,
                        product_name,
                        variant_name,
                        product_sku,
                        price: parse_money(&price_s)?,
                        quantity,
                        line_total: parse_money(&line_total_s)?,
                    })
                },
            )
            .collect()
    }
}
