use std::sync::Arc;

use axum::{Json, extract::State, http::HeaderMap, http::StatusCode};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::customers::{CreateCustomerPayload, hash_password, verify_password};
use crate::error::{Result as AppResult, StorefrontError};
use crate::server::AppState;
use crate::server::auth::{bearer_token, ensure_customer};
use crate::sessions::{SessionRecord, hash_session_token, issue_session_token, session_ttl_secs};

async fn open_session(app_state: &AppState, customer_id: &str) -> AppResult<String> {
    let token = issue_session_token();
    let now = Utc::now();
    app_state
        .sessions
        .create_session(SessionRecord {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            token_hash: hash_session_token(&token),
            created_at: now,
            expires_at: now + Duration::seconds(session_ttl_secs()),
            revoked_at: None,
        })
        .await?;
    Ok(token)
}

pub async fn register(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateCustomerPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let email = payload.email.trim();
    if !email.contains('@') {
        return Err(StorefrontError::Validation(
            "a valid email address is required".into(),
        ));
    }
    if payload.password.len() < 8 {
        return Err(StorefrontError::Validation(
            "password must be at least 8 characters long".into(),
        ));
    }

    let password_hash = hash_password(&payload.password)?;
    let customer = app_state
        .customers
        .create_customer(email, &password_hash)
        .await?;
    let token = open_session(&app_state, &customer.id).await?;

    tracing::info!(customer_id = %customer.id, "customer registered");
    Ok(Json(serde_json::json!({
        "token": token,
        "customer": { "id": customer.id, "email": customer.email },
    })))
}

pub async fn login(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateCustomerPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let customer = app_state
        .customers
        .get_customer_by_email(payload.email.trim())
        .await?;
    // Same failure for unknown email and wrong password.
    let Some(customer) = customer else {
        return Err(StorefrontError::Unauthorized("invalid credentials".into()));
    };
    if !verify_password(&payload.password, &customer.password_hash) {
        return Err(StorefrontError::Unauthorized("invalid credentials".into()));
    }

    let token = open_session(&app_state, &customer.id).await?;
    Ok(Json(serde_json::json!({
        "token": token,
        "customer": { "id": customer.id, "email": customer.email },
    })))
}

pub async fn logout(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    if let Some(token) = bearer_token(&headers) {
        app_state
            .sessions
            .revoke_session(&hash_session_token(&token), Utc::now())
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let customer = ensure_customer(&headers, &app_state).await?;
    Ok(Json(serde_json::json!({
        "customer": { "id": customer.id, "email": customer.email },
    })))
}
