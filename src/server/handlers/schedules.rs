use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{Result as AppResult, StorefrontError};
use crate::schedule::{
    Frequency, ReorderScheduleRecord, ResumeMode, ScheduleEvent, ScheduleItemChange,
    ScheduleItemRecord, ScheduleStatus, Transition, next_date, resume_date, transition,
};
use crate::server::AppState;
use crate::server::auth::ensure_customer;

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub order_id: String,
    pub frequency: String,
    pub payment_method_id: String,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub card_last4: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<ItemChangeRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct ItemChangeRequest {
    pub product_variant_id: String,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub remove: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResumeQuery {
    #[serde(default)]
    pub resume_type: Option<String>,
}

fn schedule_json(
    schedule: &ReorderScheduleRecord,
    items: &[ScheduleItemRecord],
) -> serde_json::Value {
    serde_json::json!({
        "id": schedule.id,
        "frequency": schedule.frequency,
        "status": schedule.status,
        "next_scheduled_date": schedule.next_scheduled_date,
        "card_brand": schedule.card_brand,
        "card_last4": schedule.card_last4,
        "items": items.iter().map(|item| serde_json::json!({
            "product_variant_id": item.product_variant_id,
            "quantity": item.quantity,
            "price": item.price,
        })).collect::<Vec<_>>(),
    })
}

/// Ownership-scoped fetch; a schedule that is missing or belongs to
/// another customer is indistinguishable from not existing.
async fn owned_schedule(
    app_state: &AppState,
    id: &str,
    customer_id: &str,
) -> AppResult<ReorderScheduleRecord> {
    app_state
        .schedules
        .get_schedule_for_customer(id, customer_id)
        .await?
        .ok_or(StorefrontError::NotFound)
}

pub async fn index(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let schedules = app_state
        .schedules
        .list_schedules_for_customer(&customer.id)
        .await?;

    let mut out = Vec::with_capacity(schedules.len());
    for schedule in &schedules {
        let items = app_state.schedules.list_items(&schedule.id).await?;
        out.push(schedule_json(schedule, &items));
    }
    Ok(Json(serde_json::json!({ "schedules": out })))
}

pub async fn show(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;
    let items = app_state.schedules.list_items(&schedule.id).await?;
    let pending = app_state
        .pending_orders
        .list_for_schedule(&schedule.id)
        .await?;
    Ok(Json(serde_json::json!({
        "schedule": schedule_json(&schedule, &items),
        "pending_orders": pending.iter().map(|po| serde_json::json!({
            "id": po.id,
            "status": po.status,
            "scheduled_for": po.scheduled_for,
            "total": po.items_snapshot.total,
        })).collect::<Vec<_>>(),
    })))
}

/// Sets up a schedule from a previous order: the order's lines become the
/// standing items at their order-time prices, and the first delivery is
/// one interval out.
pub async fn create(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateScheduleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;

    let frequency = Frequency::parse(&payload.frequency).ok_or_else(|| {
        StorefrontError::Validation(format!("unknown frequency `{}`", payload.frequency))
    })?;
    if payload.payment_method_id.trim().is_empty() {
        return Err(StorefrontError::Validation(
            "payment method is required".into(),
        ));
    }

    let order = app_state
        .orders
        .get_order_for_customer(&payload.order_id, &customer.id)
        .await?
        .ok_or(StorefrontError::NotFound)?;
    let order_items = app_state.orders.get_order_items(&order.id).await?;
    if order_items.is_empty() {
        return Err(StorefrontError::Validation(
            "order has no items to reorder".into(),
        ));
    }

    // An order can hold the same variant twice; the schedule keeps one
    // line per variant.
    let mut items: Vec<crate::schedule::NewScheduleItem> = Vec::new();
    for item in &order_items {
        match items
            .iter()
            .position(|existing| existing.product_variant_id == item.product_variant_id)
        {
            Some(idx) => items[idx].quantity += item.quantity,
            None => items.push(crate::schedule::NewScheduleItem {
                product_variant_id: item.product_variant_id.clone(),
                quantity: item.quantity,
                price: item.price,
            }),
        }
    }

    let today = Utc::now().date_naive();
    let schedule = app_state
        .schedules
        .create_schedule(crate::schedule::CreateSchedulePayload {
            customer_id: customer.id.clone(),
            frequency,
            next_scheduled_date: next_date(frequency, today),
            payment_method_id: payload.payment_method_id,
            card_brand: payload.card_brand,
            card_last4: payload.card_last4,
            items,
        })
        .await?;
    let items = app_state.schedules.list_items(&schedule.id).await?;

    tracing::info!(schedule_id = %schedule.id, customer_id = %customer.id, "schedule created");
    Ok(Json(serde_json::json!({
        "message": "Your reorder schedule has been set up successfully!",
        "schedule": schedule_json(&schedule, &items),
    })))
}

pub async fn update(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateScheduleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;

    if schedule.status == ScheduleStatus::Cancelled {
        return Err(StorefrontError::Validation(
            "schedule has been cancelled".into(),
        ));
    }

    let frequency = payload
        .frequency
        .as_deref()
        .map(|s| {
            Frequency::parse(s).ok_or_else(|| {
                StorefrontError::Validation(format!("unknown frequency `{}`", s))
            })
        })
        .transpose()?;

    if let Some(item_changes) = &payload.items {
        let current = app_state.schedules.list_items(&schedule.id).await?;
        let mut changes = Vec::with_capacity(item_changes.len());
        for change in item_changes {
            let is_new = !current
                .iter()
                .any(|item| item.product_variant_id == change.product_variant_id);
            // New lines remember the current catalog price.
            let price = if is_new && !change.remove {
                let variant = app_state
                    .catalog
                    .get_variant(&change.product_variant_id)
                    .await?
                    .filter(|v| v.active)
                    .ok_or_else(|| {
                        StorefrontError::Validation(format!(
                            "product `{}` is not available",
                            change.product_variant_id
                        ))
                    })?;
                Some(variant.price)
            } else {
                None
            };
            changes.push(ScheduleItemChange {
                product_variant_id: change.product_variant_id.clone(),
                quantity: change.quantity,
                price,
                remove: change.remove,
            });
        }

        let allow_empty = schedule.status != ScheduleStatus::Active;
        app_state
            .schedules
            .apply_item_changes(&schedule.id, &changes, allow_empty)
            .await?;
    }

    if let Some(frequency) = frequency {
        app_state.schedules.set_frequency(&schedule.id, frequency).await?;
    }

    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;
    let items = app_state.schedules.list_items(&schedule.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Your reorder schedule has been updated.",
        "schedule": schedule_json(&schedule, &items),
    })))
}

pub async fn pause(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;

    if let Transition::Apply(_) = transition(schedule.status, ScheduleEvent::Pause)? {
        app_state.schedules.mark_paused(&schedule.id, Utc::now()).await?;
        tracing::info!(schedule_id = %schedule.id, "schedule paused");
    }

    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;
    let items = app_state.schedules.list_items(&schedule.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Your reorder schedule has been paused.",
        "schedule": schedule_json(&schedule, &items),
    })))
}

pub async fn resume(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<ResumeQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;

    let mode = match query.resume_type.as_deref() {
        None => ResumeMode::default(),
        Some(s) => ResumeMode::parse(s).ok_or_else(|| {
            StorefrontError::Validation(format!("unknown resume_type `{}`", s))
        })?,
    };

    if let Transition::Apply(_) = transition(schedule.status, ScheduleEvent::Resume)? {
        let today = Utc::now().date_naive();
        let new_date = resume_date(
            schedule.frequency,
            schedule.next_scheduled_date,
            today,
            mode,
        );
        app_state.schedules.mark_active(&schedule.id, new_date).await?;
        tracing::info!(
            schedule_id = %schedule.id,
            next_scheduled_date = %new_date,
            "schedule resumed"
        );
    }

    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;
    let items = app_state.schedules.list_items(&schedule.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Your reorder schedule has been resumed.",
        "schedule": schedule_json(&schedule, &items),
    })))
}

/// Skips the upcoming delivery: expires any open pending order for the
/// cycle and moves the schedule forward one interval.
pub async fn skip_next(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;

    transition(schedule.status, ScheduleEvent::SkipNext)?;

    let now = Utc::now();
    for pending in app_state
        .pending_orders
        .list_pending_for_schedule(&schedule.id)
        .await?
    {
        app_state.pending_orders.mark_expired(&pending.id, now).await?;
        tracing::info!(
            schedule_id = %schedule.id,
            pending_order_id = %pending.id,
            "pending order expired by skip"
        );
    }

    let new_date = next_date(schedule.frequency, schedule.next_scheduled_date);
    app_state
        .schedules
        .set_next_scheduled_date(&schedule.id, new_date)
        .await?;

    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;
    let items = app_state.schedules.list_items(&schedule.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Your next delivery has been skipped.",
        "schedule": schedule_json(&schedule, &items),
    })))
}

pub async fn cancel(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    let schedule = owned_schedule(&app_state, &id, &customer.id).await?;

    if let Transition::Apply(_) = transition(schedule.status, ScheduleEvent::Cancel)? {
        let now = Utc::now();
        app_state.schedules.mark_cancelled(&schedule.id, now).await?;
        // A cancelled schedule leaves no open proposals behind.
        for pending in app_state
            .pending_orders
            .list_pending_for_schedule(&schedule.id)
            .await?
        {
            app_state.pending_orders.mark_expired(&pending.id, now).await?;
        }
        tracing::info!(schedule_id = %schedule.id, "schedule cancelled");
    }

    Ok(Json(serde_json::json!({
        "message": "Your reorder schedule has been cancelled.",
    })))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::AUTHORIZATION};
    use chrono::{Duration, Months, Utc};
    use std::sync::Arc;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::payments::testing::RecordingProcessor;
    use crate::pending_orders::{ItemsSnapshot, PendingOrderStatus};
    use crate::schedule::{Frequency, ScheduleStatus};
    use crate::server::handlers::routes;
    use crate::server::test_support::{seed_customer, seed_schedule, seed_variant, test_state};

    fn empty_snapshot() -> ItemsSnapshot {
        ItemsSnapshot {
            items: vec![],
            subtotal: rust_decimal::Decimal::ZERO,
            vat: rust_decimal::Decimal::ZERO,
            shipping: rust_decimal::Decimal::ZERO,
            total: rust_decimal::Decimal::ZERO,
            unavailable_items: vec![],
        }
    }

    fn authed(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {}", token));
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn pause_changes_status_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(10);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryMonth,
            next,
            &[("pv_1", 2, "9.99")],
        )
        .await;

        for _ in 0..2 {
            let response = routes()
                .with_state(state.clone())
                .oneshot(authed(
                    "POST",
                    &format!("/reorder-schedules/{}/pause", schedule.id),
                    &token,
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Paused);
        assert!(stored.paused_at.is_some());
    }

    #[tokio::test]
    async fn other_customers_schedule_reads_as_not_found() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (owner, _) = seed_customer(&state, "owner@example.com").await;
        let (_, intruder_token) = seed_customer(&state, "intruder@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(10);
        let schedule = seed_schedule(
            &state,
            &owner.id,
            Frequency::EveryWeek,
            next,
            &[("pv_1", 1, "4.99")],
        )
        .await;

        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "POST",
                &format!("/reorder-schedules/{}/pause", schedule.id),
                &intruder_token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Active);
    }

    #[tokio::test]
    async fn resume_asap_restarts_from_today() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let today = Utc::now().date_naive();
        let stale = today - Months::new(2);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryMonth,
            stale,
            &[("pv_1", 2, "9.99")],
        )
        .await;
        state.schedules.mark_paused(&schedule.id, Utc::now()).await.unwrap();

        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "POST",
                &format!("/reorder-schedules/{}/resume?resume_type=asap", schedule.id),
                &token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Active);
        assert!(stored.paused_at.is_none());
        assert_eq!(stored.next_scheduled_date, today + Months::new(1));
    }

    #[tokio::test]
    async fn resume_original_schedule_walks_the_old_cadence_forward() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let today = Utc::now().date_naive();
        let original = today - Months::new(2);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryMonth,
            original,
            &[("pv_1", 2, "9.99")],
        )
        .await;
        state.schedules.mark_paused(&schedule.id, Utc::now()).await.unwrap();

        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "POST",
                &format!(
                    "/reorder-schedules/{}/resume?resume_type=original_schedule",
                    schedule.id
                ),
                &token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        // Two months behind on a monthly cadence: original + 3 months,
        // one month from today.
        assert_eq!(stored.next_scheduled_date, original + Months::new(3));
        assert!(stored.next_scheduled_date > today);
    }

    #[tokio::test]
    async fn resume_defaults_to_asap() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let today = Utc::now().date_naive();
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryMonth,
            today - Months::new(2),
            &[("pv_1", 2, "9.99")],
        )
        .await;
        state.schedules.mark_paused(&schedule.id, Utc::now()).await.unwrap();

        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "POST",
                &format!("/reorder-schedules/{}/resume", schedule.id),
                &token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.next_scheduled_date, today + Months::new(1));
    }

    #[tokio::test]
    async fn skip_next_advances_date_and_expires_open_pending_order() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(3);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryTwoWeeks,
            next,
            &[("pv_1", 2, "9.99")],
        )
        .await;
        let pending = state
            .pending_orders
            .create_pending_order(&schedule.id, next, &empty_snapshot())
            .await
            .unwrap()
            .unwrap();

        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "POST",
                &format!("/reorder-schedules/{}/skip-next", schedule.id),
                &token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.next_scheduled_date, next + Duration::days(14));

        let pending = state
            .pending_orders
            .get_pending_order(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.status, PendingOrderStatus::Expired);
        assert!(pending.expired_at.is_some());
    }

    #[tokio::test]
    async fn skip_next_on_paused_schedule_is_rejected() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(3);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryWeek,
            next,
            &[("pv_1", 2, "9.99")],
        )
        .await;
        state.schedules.mark_paused(&schedule.id, Utc::now()).await.unwrap();

        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "POST",
                &format!("/reorder-schedules/{}/skip-next", schedule.id),
                &token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.next_scheduled_date, next);
    }

    #[tokio::test]
    async fn cancelled_schedule_rejects_pause_and_resume() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(3);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryWeek,
            next,
            &[("pv_1", 2, "9.99")],
        )
        .await;

        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "DELETE",
                &format!("/reorder-schedules/{}", schedule.id),
                &token,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for action in ["pause", "resume"] {
            let response = routes()
                .with_state(state.clone())
                .oneshot(authed(
                    "POST",
                    &format!("/reorder-schedules/{}/{}", schedule.id, action),
                    &token,
                    None,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }

        let stored = state.schedules.get_schedule(&schedule.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ScheduleStatus::Cancelled);
        assert!(stored.cancelled_at.is_some());
    }

    #[tokio::test]
    async fn item_update_rejects_emptying_an_active_schedule() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(3);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryWeek,
            next,
            &[("pv_1", 2, "9.99")],
        )
        .await;

        let body = serde_json::json!({
            "items": [{ "product_variant_id": "pv_1", "remove": true }]
        });
        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "PATCH",
                &format!("/reorder-schedules/{}", schedule.id),
                &token,
                Some(body.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            state.schedules.list_items(&schedule.id).await.unwrap().len(),
            1
        );

        // The same update goes through while the schedule is paused.
        state.schedules.mark_paused(&schedule.id, Utc::now()).await.unwrap();
        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "PATCH",
                &format!("/reorder-schedules/{}", schedule.id),
                &token,
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.schedules.list_items(&schedule.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn item_update_adds_and_requantifies() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        seed_variant(&state, "pv_2", "14.50", true).await;
        let next = Utc::now().date_naive() + Duration::days(3);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryWeek,
            next,
            &[("pv_1", 2, "9.99")],
        )
        .await;

        let body = serde_json::json!({
            "items": [
                { "product_variant_id": "pv_1", "quantity": 5 },
                { "product_variant_id": "pv_2", "quantity": 1 },
            ]
        });
        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "PATCH",
                &format!("/reorder-schedules/{}", schedule.id),
                &token,
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let items = state.schedules.list_items(&schedule.id).await.unwrap();
        assert_eq!(items.len(), 2);
        let pv1 = items.iter().find(|i| i.product_variant_id == "pv_1").unwrap();
        assert_eq!(pv1.quantity, 5);
        let pv2 = items.iter().find(|i| i.product_variant_id == "pv_2").unwrap();
        // New lines remember the catalog price at add time.
        assert_eq!(pv2.price.to_string(), "14.50");
    }

    #[tokio::test]
    async fn item_update_rejects_non_positive_quantity() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(3);
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryWeek,
            next,
            &[("pv_1", 2, "9.99")],
        )
        .await;

        let body = serde_json::json!({
            "items": [{ "product_variant_id": "pv_1", "quantity": 0 }]
        });
        let response = routes()
            .with_state(state.clone())
            .oneshot(authed(
                "PATCH",
                &format!("/reorder-schedules/{}", schedule.id),
                &token,
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn create_builds_schedule_from_order_items() {
        let dir = tempdir().unwrap();
        let state = test_state(&dir, Arc::new(RecordingProcessor::succeeding())).await;
        let (customer, token) = seed_customer(&state, "u1@example.com").await;

        let order = state
            .orders
            .create_order(crate::orders::CreateOrderPayload {
                customer_id: customer.id.clone(),
                email: customer.email.clone(),
                order_number: "2026-ABC123".into(),
                subtotal_amount: "29.97".parse().unwrap(),
                vat_amount: "5.99".parse().unwrap(),
                shipping_amount: "6.99".parse().unwrap(),
                total_amount: "42.95".parse().unwrap(),
                payment_reference: "checkout_1".into(),
                reorder_schedule_id: None,
                items: vec![crate::orders::NewOrderItem {
                    product_variant_id: "pv_1".into(),
                    product_name: "Product pv_1".into(),
                    variant_name: "Standard".into(),
                    product_sku: Some("SKU-pv_1".into()),
                    price: "9.99".parse().unwrap(),
                    quantity: 3,
                    line_total: "29.97".parse().unwrap(),
                }],
            })
            .await
            .unwrap();

        let body = serde_json::json!({
            "order_id": order.id,
            "frequency": "every_month",
            "payment_method_id": "pm_test_456",
            "card_brand": "visa",
            "card_last4": "4242",
        });
        let response = routes()
            .with_state(state.clone())
            .oneshot(authed("POST", "/reorder-schedules", &token, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let schedule_id = json["schedule"]["id"].as_str().unwrap();

        let items = state.schedules.list_items(schedule_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].price.to_string(), "9.99");

        let stored = state.schedules.get_schedule(schedule_id).await.unwrap().unwrap();
        assert_eq!(stored.frequency, Frequency::EveryMonth);
        assert_eq!(
            stored.next_scheduled_date,
            Utc::now().date_naive() + Months::new(1)
        );
    }
}
