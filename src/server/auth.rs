use axum::http::HeaderMap;
use chrono::Utc;

use crate::customers::CustomerRecord;
use crate::error::{Result as AppResult, StorefrontError};
use crate::server::AppState;
use crate::sessions::hash_session_token;

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Resolves the bearer session token to the signed-in customer. Plan and
/// order routes all gate on this; the caller then scopes every lookup by
/// the customer id so cross-owner requests read as "not found".
pub async fn ensure_customer(
    headers: &HeaderMap,
    app_state: &AppState,
) -> AppResult<CustomerRecord> {
    let Some(token) = bearer_token(headers) else {
        return Err(StorefrontError::Unauthorized("missing bearer token".into()));
    };
    let token_hash = hash_session_token(&token);
    let Some(session) = app_state
        .sessions
        .get_live_session_by_hash(&token_hash, Utc::now())
        .await?
    else {
        return Err(StorefrontError::Unauthorized("invalid session".into()));
    };
    app_state
        .customers
        .get_customer(&session.customer_id)
        .await?
        .ok_or_else(|| StorefrontError::Unauthorized("invalid session".into()))
}

/// Static bearer token for the external scheduler hitting the sweep
/// endpoints.
pub fn ensure_job_token(headers: &HeaderMap) -> AppResult<()> {
    let expected = std::env::var("SF_JOB_TOKEN")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| StorefrontError::Config("missing env `SF_JOB_TOKEN`".into()))?;
    match bearer_token(headers) {
        Some(provided) if provided == expected => Ok(()),
        _ => Err(StorefrontError::Unauthorized("invalid job token".into())),
    }
}
