use chrono::{DateTime, Utc};

use crate::error::{Result as AppResult, StorefrontError};
use crate::link_tokens::{TokenPurpose, mint_link_token};
use crate::notifications;
use crate::orders::{CreateOrderPayload, NewOrderItem, OrderRecord, generate_order_number};
use crate::payments::{ChargeOutcome, ChargeRequest};
use crate::pending_orders::PendingOrderRecord;
use crate::schedule::next_date;
use crate::server::AppState;

/// Charge idempotency key: one per pending order, ever. Retries of the
/// same proposal reuse it, so the processor deduplicates on its side too.
pub fn idempotency_key(pending_order_id: &str) -> String {
    format!("pending_order_{}", pending_order_id)
}

async fn snapshot_order_items(
    state: &AppState,
    pending: &PendingOrderRecord,
) -> AppResult<Vec<NewOrderItem>> {
    let mut items = Vec::with_capacity(pending.items_snapshot.items.len());
    for line in &pending.items_snapshot.items {
        // SKU is display metadata, fetched fresh; price and quantity come
        // from the snapshot the customer agreed to.
        let sku = state
            .catalog
            .get_variant(&line.product_variant_id)
            .await?
            .map(|v| v.sku);
        items.push(NewOrderItem {
            product_variant_id: line.product_variant_id.clone(),
            product_name: line.product_name.clone(),
            variant_name: line.variant_name.clone(),
            product_sku: sku,
            price: line.price,
            quantity: line.quantity,
            line_total: line.line_total,
        });
    }
    Ok(items)
}

/// Materializes a confirmed proposal into a paid order, exactly once.
///
/// The pending->confirmed compare-and-swap happens before the charge, so a
/// concurrent second confirmer loses the claim and never reaches the
/// payment processor. A failed charge releases the claim; the confirm link
/// stays valid for another attempt.
pub async fn confirm_pending_order(
    state: &AppState,
    pending_order_id: &str,
    now: DateTime<Utc>,
) -> AppResult<OrderRecord> {
    let key = idempotency_key(pending_order_id);

    let Some(pending) = state
        .pending_orders
        .claim_pending_for_confirmation(pending_order_id, now)
        .await?
    else {
        // Already confirmed or expired. A previous attempt may have charged
        // and persisted the order but died before linking it back; heal the
        // linkage, then still answer "already processed".
        if let Some(existing) = state.orders.get_order_by_payment_reference(&key).await? {
            if let Some(orphan) = state.pending_orders.get_pending_order(pending_order_id).await?
            {
                if orphan.order_id.is_none() {
                    state
                        .pending_orders
                        .complete_confirmation(pending_order_id, &existing.id)
                        .await?;
                }
            }
        }
        return Err(StorefrontError::Gone(
            "this order has already been processed or has expired".to_string(),
        ));
    };

    let schedule = match state.schedules.get_schedule(&pending.schedule_id).await? {
        Some(s) => s,
        None => {
            state
                .pending_orders
                .release_confirmation_claim(pending_order_id)
                .await?;
            return Err(StorefrontError::Data(format!(
                "pending order {} has no schedule",
                pending_order_id
            )));
        }
    };
    let customer = match state.customers.get_customer(&schedule.customer_id).await? {
        Some(c) => c,
        None => {
            state
                .pending_orders
                .release_confirmation_claim(pending_order_id)
                .await?;
            return Err(StorefrontError::Data(format!(
                "schedule {} has no customer",
                schedule.id
            )));
        }
    };

    if pending.items_snapshot.items.is_empty() {
        state
            .pending_orders
            .release_confirmation_claim(pending_order_id)
            .await?;
        return Err(StorefrontError::Validation(
            "order is empty - no items to confirm".to_string(),
        ));
    }

    // Assembled before charging so the only step left after a successful
    // charge is the order insert itself.
    let items = match snapshot_order_items(state, &pending).await {
        Ok(items) => items,
        Err(e) => {
            state
                .pending_orders
                .release_confirmation_claim(pending_order_id)
                .await?;
            return Err(e);
        }
    };

    let request = ChargeRequest {
        amount: pending.items_snapshot.total,
        currency: state.config.checkout.currency.clone(),
        customer_id: customer.stripe_customer_id.clone(),
        payment_method_id: schedule.payment_method_id.clone(),
        description: format!("Scheduled reorder #{}", pending.id),
        idempotency_key: key.clone(),
    };

    let outcome = match state.payments.charge(&request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state
                .pending_orders
                .release_confirmation_claim(pending_order_id)
                .await?;
            let edit_token =
                mint_link_token(&state.link_secret, &pending.id, TokenPurpose::Edit, now);
            notifications::send_payment_failed(
                &customer.email,
                &pending,
                &e.to_string(),
                &edit_token,
            )
            .await;
            return Err(e);
        }
    };

    let payment_id = match outcome {
        ChargeOutcome::Succeeded { payment_id } => payment_id,
        ChargeOutcome::Declined { message } => {
            state
                .pending_orders
                .release_confirmation_claim(pending_order_id)
                .await?;
            let edit_token =
                mint_link_token(&state.link_secret, &pending.id, TokenPurpose::Edit, now);
            notifications::send_payment_failed(&customer.email, &pending, &message, &edit_token)
                .await;
            return Err(StorefrontError::PaymentDeclined(message));
        }
    };

    let payload = CreateOrderPayload {
        customer_id: customer.id.clone(),
        email: customer.email.clone(),
        order_number: generate_order_number(now),
        subtotal_amount: pending.items_snapshot.subtotal,
        vat_amount: pending.items_snapshot.vat,
        shipping_amount: pending.items_snapshot.shipping,
        total_amount: pending.items_snapshot.total,
        payment_reference: key,
        reorder_schedule_id: Some(schedule.id.clone()),
        items,
    };

    let order = match state.orders.create_order(payload).await {
        Ok(order) => order,
        Err(e) => {
            // Charged but could not persist: refund so no money is held
            // against a missing order, then let the customer retry.
            tracing::error!(
                pending_order_id = %pending.id,
                payment_id = %payment_id,
                "order persistence failed after successful charge: {}",
                e
            );
            if let Err(refund_err) = state.payments.refund(&payment_id).await {
                tracing::error!(
                    payment_id = %payment_id,
                    "refund failed; manual reconciliation required: {}",
                    refund_err
                );
            }
            state
                .pending_orders
                .release_confirmation_claim(pending_order_id)
                .await?;
            return Err(StorefrontError::Data(format!(
                "order creation failed: {}",
                e
            )));
        }
    };

    state
        .pending_orders
        .complete_confirmation(&pending.id, &order.id)
        .await?;
    state
        .schedules
        .set_next_scheduled_date(
            &schedule.id,
            next_date(schedule.frequency, schedule.next_scheduled_date),
        )
        .await?;

    tracing::info!(
        pending_order_id = %pending.id,
        order_id = %order.id,
        "pending order confirmed and materialized"
    );
    notifications::send_order_confirmation(&customer.email, &order).await;

    Ok(order)
}
