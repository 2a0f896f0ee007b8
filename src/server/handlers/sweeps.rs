use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::error::Result as AppResult;
use crate::server::AppState;
use crate::server::auth::ensure_job_token;
use crate::sweeps::{create_due_pending_orders, expire_stale_pending_orders};

/// The external scheduler normally omits `today`; it exists so operators
/// can replay a missed day deterministically.
#[derive(Debug, Default, Deserialize)]
pub struct SweepQuery {
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

pub async fn run_pending_order_sweep(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SweepQuery>,
) -> AppResult<Json<serde_json::Value>> {
    ensure_job_token(&headers)?;
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());

    let outcome = create_due_pending_orders(&app_state, today).await?;
    tracing::info!(
        created = outcome.created,
        skipped = outcome.skipped,
        "pending order sweep finished"
    );
    Ok(Json(serde_json::json!({
        "created": outcome.created,
        "skipped": outcome.skipped,
    })))
}

pub async fn run_expiry_sweep(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SweepQuery>,
) -> AppResult<Json<serde_json::Value>> {
    ensure_job_token(&headers)?;
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());

    let outcome = expire_stale_pending_orders(&app_state, today).await?;
    tracing::info!(expired = outcome.expired, "expiry sweep finished");
    Ok(Json(serde_json::json!({ "expired": outcome.expired })))
}
