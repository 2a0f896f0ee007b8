use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use crate::confirmation::confirm_pending_order;
use crate::error::{Result as AppResult, StorefrontError};
use crate::link_tokens::{TokenPurpose, verify_link_token};
use crate::pending_orders::PendingOrderRecord;
use crate::server::AppState;
use crate::snapshot::{ItemEdit, rebuild_snapshot};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemsRequest {
    #[serde(default)]
    pub items: Vec<ItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ItemRequest {
    pub product_variant_id: String,
    pub quantity: i64,
}

fn pending_order_json(pending: &PendingOrderRecord) -> serde_json::Value {
    serde_json::json!({
        "id": pending.id,
        "status": pending.status,
        "scheduled_for": pending.scheduled_for,
        "items_snapshot": pending.items_snapshot,
    })
}

/// Loads the pending order a link token grants access to. Any token
/// failure is a plain 404: the caller learns nothing about whether the id
/// exists. A terminal status answers 410 so double-clicks read as "already
/// processed" rather than an error.
async fn authorize(
    app_state: &AppState,
    id: &str,
    token: Option<&str>,
    purpose: TokenPurpose,
) -> AppResult<PendingOrderRecord> {
    let token = token.ok_or(StorefrontError::NotFound)?;
    let now = Utc::now();
    if let Err(reason) = verify_link_token(&app_state.link_secret, token, purpose, id, now) {
        tracing::debug!(pending_order_id = %id, "link token rejected: {}", reason);
        return Err(StorefrontError::NotFound);
    }

    let pending = app_state
        .pending_orders
        .get_pending_order(id)
        .await?
        .ok_or(StorefrontError::NotFound)?;
    if pending.status.is_terminal() {
        return Err(StorefrontError::Gone(
            "this order has already been processed or has expired".to_string(),
        ));
    }
    Ok(pending)
}

/// POST /pending-orders/{id}/confirm?token=...
pub async fn confirm(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<serde_json::Value>> {
    authorize(&app_state, &id, query.token.as_deref(), TokenPurpose::Confirm).await?;

    let order = confirm_pending_order(&app_state, &id, Utc::now()).await?;
    Ok(Json(serde_json::json!({
        "message": "Your order has been confirmed!",
        "order": {
            "id": order.id,
            "order_number": order.order_number,
            "total_amount": order.total_amount,
        },
    })))
}

/// GET /pending-orders/{id}/edit?token=...
pub async fn edit(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let pending =
        authorize(&app_state, &id, query.token.as_deref(), TokenPurpose::Edit).await?;
    Ok(Json(serde_json::json!({
        "pending_order": pending_order_json(&pending),
    })))
}

/// PATCH /pending-orders/{id}?token=...
pub async fn update(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
    Json(payload): Json<UpdateItemsRequest>,
) -> AppResult<Json<serde_json::Value>> {
    authorize(&app_state, &id, query.token.as_deref(), TokenPurpose::Edit).await?;

    let edits: Vec<ItemEdit> = payload
        .items
        .iter()
        .map(|item| ItemEdit {
            product_variant_id: item.product_variant_id.clone(),
            quantity: item.quantity,
        })
        .collect();

    let snapshot =
        rebuild_snapshot(&edits, app_state.catalog.as_ref(), &app_state.config.checkout).await?;

    // The order may have been confirmed or expired while the edit was in
    // flight; the conditional update turns that race into a 410.
    if !app_state.pending_orders.replace_snapshot(&id, &snapshot).await? {
        return Err(StorefrontError::Gone(
            "this order has already been processed or has expired".to_string(),
        ));
    }

    let pending = app_state
        .pending_orders
        .get_pending_order(&id)
        .await?
        .ok_or(StorefrontError::NotFound)?;
    tracing::info!(pending_order_id = %id, "pending order snapshot updated");
    Ok(Json(serde_json::json!({
        "message": "Order updated successfully",
        "pending_order": pending_order_json(&pending),
    })))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::confirmation::idempotency_key;
    use crate::link_tokens::{TokenPurpose, mint_link_token};
    use crate::payments::testing::RecordingProcessor;
    use crate::pending_orders::{PendingOrderRecord, PendingOrderStatus};
    use crate::schedule::Frequency;
    use crate::server::AppState;
    use crate::server::handlers::routes;
    use crate::server::test_support::{seed_customer, seed_schedule, seed_variant, test_state};
    use crate::snapshot::build_snapshot;

    async fn seed_pending_order(state: &Arc<AppState>) -> PendingOrderRecord {
        let (customer, _) = seed_customer(state, "u1@example.com").await;
        seed_variant(state, "pv_1", "24.99", true).await;
        let next = Utc::now().date_naive() + Duration::days(3);
        let schedule = seed_schedule(
            state,
            &customer.id,
            Frequency::EveryMonth,
            next,
            &[("pv_1", 2, "19.99")],
        )
        .await;
        let items = state.schedules.list_items(&schedule.id).await.unwrap();
        let snapshot = build_snapshot(&items, state.catalog.as_ref(), &state.config.checkout)
            .await
            .unwrap();
        state
            .pending_orders
            .create_pending_order(&schedule.id, next, &snapshot)
            .await
            .unwrap()
            .unwrap()
    }

    fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
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

    fn confirm_uri(state: &AppState, pending: &PendingOrderRecord) -> String {
        let token = mint_link_token(
            &state.link_secret,
            &pending.id,
            TokenPurpose::Confirm,
            Utc::now(),
        );
        format!("/pending-orders/{}/confirm?token={}", pending.id, token)
    }

    #[tokio::test]
    async fn confirm_charges_once_and_materializes_order() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;
        let expected_total = pending.items_snapshot.total;

        let response = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &confirm_uri(&state, &pending), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let order_id = json["order"]["id"].as_str().unwrap().to_string();

        assert_eq!(payments.charge_count(), 1);
        let charge = payments.charges.lock().unwrap()[0].clone();
        assert_eq!(charge.amount, expected_total);
        assert_eq!(charge.payment_method_id, "pm_test_123");
        assert_eq!(charge.idempotency_key, idempotency_key(&pending.id));

        let stored = state
            .pending_orders
            .get_pending_order(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PendingOrderStatus::Confirmed);
        assert_eq!(stored.order_id.as_deref(), Some(order_id.as_str()));
        assert!(stored.confirmed_at.is_some());

        // Order rows mirror the snapshot, not the schedule.
        let order = state.orders.get_order(&order_id).await.unwrap().unwrap();
        assert_eq!(order.total_amount, expected_total);
        let items = state.orders.get_order_items(&order_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price.to_string(), "24.99");
        assert_eq!(items[0].quantity, 2);

        // Confirming advanced the schedule to the next cycle.
        let schedule = state
            .schedules
            .get_schedule(&stored.schedule_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            schedule.next_scheduled_date,
            crate::schedule::next_date(Frequency::EveryMonth, pending.scheduled_for)
        );
    }

    #[tokio::test]
    async fn second_confirm_is_gone_and_never_charges_again() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;
        let uri = confirm_uri(&state, &pending);

        let first = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &uri, None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &uri, None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::GONE);
        assert_eq!(payments.charge_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_confirms_charge_exactly_once() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;
        let uri = confirm_uri(&state, &pending);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let state = state.clone();
            let uri = uri.clone();
            handles.push(tokio::spawn(async move {
                routes()
                    .with_state(state)
                    .oneshot(request("POST", &uri, None))
                    .await
                    .unwrap()
                    .status()
            }));
        }

        let mut ok = 0;
        let mut gone = 0;
        for handle in handles {
            match handle.await.unwrap() {
                StatusCode::OK => ok += 1,
                StatusCode::GONE => gone += 1,
                other => panic!("unexpected status {}", other),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(gone, 3);
        assert_eq!(payments.charge_count(), 1);
    }

    #[tokio::test]
    async fn declined_charge_leaves_order_pending_and_retryable() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::declining("card was declined"));
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;
        let uri = confirm_uri(&state, &pending);

        let response = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &uri, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"], serde_json::json!("card was declined"));
        assert_eq!(payments.charge_count(), 1);

        let stored = state
            .pending_orders
            .get_pending_order(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PendingOrderStatus::Pending);
        assert!(stored.order_id.is_none());
        assert!(stored.confirmed_at.is_none());

        // The same link works for the retry once the card issue is fixed.
        *payments.script.lock().unwrap() =
            crate::payments::testing::ChargeScript::Succeed;
        let retry = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &uri, None))
            .await
            .unwrap();
        assert_eq!(retry.status(), StatusCode::OK);
        assert_eq!(payments.charge_count(), 2);
    }

    #[tokio::test]
    async fn processor_error_also_leaves_order_pending() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        *payments.script.lock().unwrap() =
            crate::payments::testing::ChargeScript::Fail("gateway timeout".into());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;

        let response = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &confirm_uri(&state, &pending), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let stored = state
            .pending_orders
            .get_pending_order(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PendingOrderStatus::Pending);
        assert!(stored.order_id.is_none());
    }

    #[tokio::test]
    async fn confirm_with_edit_token_is_not_found() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;

        let edit_token = mint_link_token(
            &state.link_secret,
            &pending.id,
            TokenPurpose::Edit,
            Utc::now(),
        );
        let response = routes()
            .with_state(state.clone())
            .oneshot(request(
                "POST",
                &format!("/pending-orders/{}/confirm?token={}", pending.id, edit_token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(payments.charge_count(), 0);
    }

    #[tokio::test]
    async fn confirm_with_token_for_another_order_is_not_found() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;

        let foreign_token = mint_link_token(
            &state.link_secret,
            "some-other-id",
            TokenPurpose::Confirm,
            Utc::now(),
        );
        let response = routes()
            .with_state(state.clone())
            .oneshot(request(
                "POST",
                &format!(
                    "/pending-orders/{}/confirm?token={}",
                    pending.id, foreign_token
                ),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(payments.charge_count(), 0);
    }

    #[tokio::test]
    async fn expired_order_confirm_is_gone_without_charge() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;
        state
            .pending_orders
            .mark_expired(&pending.id, Utc::now())
            .await
            .unwrap();

        let response = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &confirm_uri(&state, &pending), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
        assert_eq!(payments.charge_count(), 0);
    }

    #[tokio::test]
    async fn edit_shows_snapshot_with_edit_token_only() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;

        let edit_token = mint_link_token(
            &state.link_secret,
            &pending.id,
            TokenPurpose::Edit,
            Utc::now(),
        );
        let response = routes()
            .with_state(state.clone())
            .oneshot(request(
                "GET",
                &format!("/pending-orders/{}/edit?token={}", pending.id, edit_token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json["pending_order"]["items_snapshot"]["items"][0]["price"],
            serde_json::json!("24.99")
        );

        let confirm_token = mint_link_token(
            &state.link_secret,
            &pending.id,
            TokenPurpose::Confirm,
            Utc::now(),
        );
        let response = routes()
            .with_state(state.clone())
            .oneshot(request(
                "GET",
                &format!("/pending-orders/{}/edit?token={}", pending.id, confirm_token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_reprices_from_live_catalog() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;

        // Catalog price moves after the snapshot was taken.
        seed_variant(&state, "pv_1", "30.00", true).await;

        let edit_token = mint_link_token(
            &state.link_secret,
            &pending.id,
            TokenPurpose::Edit,
            Utc::now(),
        );
        let body = serde_json::json!({
            "items": [{ "product_variant_id": "pv_1", "quantity": 1 }]
        });
        let response = routes()
            .with_state(state.clone())
            .oneshot(request(
                "PATCH",
                &format!("/pending-orders/{}?token={}", pending.id, edit_token),
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state
            .pending_orders
            .get_pending_order(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.items_snapshot.items[0].price.to_string(), "30.00");
        assert_eq!(stored.items_snapshot.subtotal.to_string(), "30.00");
        assert_eq!(stored.status, PendingOrderStatus::Pending);
    }

    #[tokio::test]
    async fn update_rejecting_empty_items_leaves_snapshot_unchanged() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;
        let original_snapshot = pending.items_snapshot.clone();

        let edit_token = mint_link_token(
            &state.link_secret,
            &pending.id,
            TokenPurpose::Edit,
            Utc::now(),
        );
        for body in [
            serde_json::json!({ "items": [] }),
            serde_json::json!({ "items": [{ "product_variant_id": "pv_1", "quantity": 0 }] }),
            serde_json::json!({ "items": [{ "product_variant_id": "pv_1", "quantity": -2 }] }),
        ] {
            let response = routes()
                .with_state(state.clone())
                .oneshot(request(
                    "PATCH",
                    &format!("/pending-orders/{}?token={}", pending.id, edit_token),
                    Some(body),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }

        let stored = state
            .pending_orders
            .get_pending_order(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.items_snapshot, original_snapshot);
    }

    #[tokio::test]
    async fn confirm_empty_snapshot_is_validation_failure() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let (customer, _) = seed_customer(&state, "u1@example.com").await;
        let next = Utc::now().date_naive() + Duration::days(3);
        // Schedule whose only item vanished from the catalog entirely.
        let schedule = seed_schedule(
            &state,
            &customer.id,
            Frequency::EveryMonth,
            next,
            &[("pv_gone", 1, "9.99")],
        )
        .await;
        let items = state.schedules.list_items(&schedule.id).await.unwrap();
        let snapshot = build_snapshot(&items, state.catalog.as_ref(), &state.config.checkout)
            .await
            .unwrap();
        let pending = state
            .pending_orders
            .create_pending_order(&schedule.id, next, &snapshot)
            .await
            .unwrap()
            .unwrap();

        let response = routes()
            .with_state(state.clone())
            .oneshot(request("POST", &confirm_uri(&state, &pending), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(payments.charge_count(), 0);

        // Not consumed: the proposal is still pending for an edit.
        let stored = state
            .pending_orders
            .get_pending_order(&pending.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, PendingOrderStatus::Pending);
    }

    #[tokio::test]
    async fn missing_token_is_not_found() {
        let dir = tempdir().unwrap();
        let payments = Arc::new(RecordingProcessor::succeeding());
        let state = test_state(&dir, payments.clone()).await;
        let pending = seed_pending_order(&state).await;

        let response = routes()
            .with_state(state.clone())
            .oneshot(request(
                "POST",
                &format!("/pending-orders/{}/confirm", pending.id),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
