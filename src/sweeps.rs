use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::Result as AppResult;
use crate::link_tokens::{TokenPurpose, mint_link_token};
use crate::notifications;
use crate::server::AppState;
use crate::snapshot::build_snapshot;

#[derive(Debug, Default, Serialize)]
pub struct CreateSweepOutcome {
    pub created: usize,
    pub skipped: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct ExpirySweepOutcome {
    pub expired: usize,
}

/// Creates pending orders for every active schedule whose delivery lands
/// `lead_days` from `today`, pricing each from the live catalog, and sends
/// the reminder email with confirm/edit links. Safe to run concurrently:
/// the open-cycle unique guard turns duplicates into skips.
pub async fn create_due_pending_orders(
    state: &AppState,
    today: NaiveDate,
) -> AppResult<CreateSweepOutcome> {
    let due_on = today + Duration::days(state.config.reorder.lead_days);
    let schedules = state.schedules.list_active_due_on(due_on).await?;

    let mut outcome = CreateSweepOutcome::default();
    for schedule in schedules {
        let items = state.schedules.list_items(&schedule.id).await?;
        if items.is_empty() {
            // Setup never finished for this schedule; nothing to propose.
            tracing::info!(schedule_id = %schedule.id, "skipping schedule with no items");
            outcome.skipped += 1;
            continue;
        }

        let snapshot =
            build_snapshot(&items, state.catalog.as_ref(), &state.config.checkout).await?;
        let created = state
            .pending_orders
            .create_pending_order(&schedule.id, schedule.next_scheduled_date, &snapshot)
            .await?;

        match created {
            Some(pending) => {
                let now = Utc::now();
                let confirm_token =
                    mint_link_token(&state.link_secret, &pending.id, TokenPurpose::Confirm, now);
                let edit_token =
                    mint_link_token(&state.link_secret, &pending.id, TokenPurpose::Edit, now);
                if let Some(customer) =
                    state.customers.get_customer(&schedule.customer_id).await?
                {
                    notifications::send_order_ready(
                        &customer.email,
                        &pending,
                        &confirm_token,
                        &edit_token,
                    )
                    .await;
                }
                tracing::info!(
                    schedule_id = %schedule.id,
                    pending_order_id = %pending.id,
                    "created pending order"
                );
                outcome.created += 1;
            }
            None => {
                tracing::info!(
                    schedule_id = %schedule.id,
                    scheduled_for = %schedule.next_scheduled_date,
                    "pending order already exists for this cycle"
                );
                outcome.skipped += 1;
            }
        }
    }
    Ok(outcome)
}

/// Expires pending orders left unconfirmed `expiry_days` past their
/// delivery date and notifies the customer.
pub async fn expire_stale_pending_orders(
    state: &AppState,
    today: NaiveDate,
) -> AppResult<ExpirySweepOutcome> {
    let cutoff = today - Duration::days(state.config.reorder.expiry_days);
    let stale = state.pending_orders.list_pending_scheduled_before(cutoff).await?;

    let mut outcome = ExpirySweepOutcome::default();
    for pending in stale {
        if !state.pending_orders.mark_expired(&pending.id, Utc::now()).await? {
            continue;
        }
        outcome.expired += 1;
        tracing::info!(pending_order_id = %pending.id, "pending order expired");

        if let Some(schedule) = state.schedules.get_schedule(&pending.schedule_id).await? {
            if let Some(customer) = state.customers.get_customer(&schedule.customer_id).await? {
                notifications::send_order_expired(&customer.email, &pending).await;
            }
        }
    }
    Ok(outcome)
}
