use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};

use crate::error::{Result as AppResult, StorefrontError};
use crate::orders::{OrderItemRecord, OrderRecord};
use crate::server::AppState;
use crate::server::auth::ensure_customer;

fn order_json(order: &OrderRecord, items: &[OrderItemRecord]) -> serde_json::Value {
    serde_json::json!({
        "id": order.id,
        "order_number": order.order_number,
        "status": order.status,
        "subtotal_amount": order.subtotal_amount,
        "vat_amount": order.vat_amount,
        "shipping_amount": order.shipping_amount,
        "total_amount": order.total_amount,
        "reorder_schedule_id": order.reorder_schedule_id,
        "created_at": order.created_at,
        "items": items.iter().map(|item| serde_json::json!({
            "product_variant_id": item.product_variant_id,
            "product_name": item.product_name,
            "variant_name": item.variant_name,
            "product_sku": item.product_sku,
            "price": item.price,
            "quantity": item.quantity,
            "line_total": item.line_total,
        })).collect::<Vec<_>>(),
    })
}

pub async fn index(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let orders = app_state
        .orders
        .list_orders_for_customer(&customer.id)
        .await?;

    let mut out = Vec::with_capacity(orders.len());
    for order in &orders {
        let items = app_state.orders.get_order_items(&order.id).await?;
        out.push(order_json(order, &items));
    }
    Ok(Json(serde_json::json!({ "orders": out })))
}

pub async fn show(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let order = app_state
        .orders
        .get_order_for_customer(&id, &customer.id)
        .await?
        .ok_or(StorefrontError::NotFound)?;
    let items = app_state.orders.get_order_items(&order.id).await?;
    Ok(Json(serde_json::json!({ "order": order_json(&order, &items) })))
}
