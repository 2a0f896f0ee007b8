use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Time parse error: {0}")]
    TimeParse(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Unauthorized(String),

    // Token failures, missing rows and cross-owner access all collapse into
    // this variant so a response never reveals whether the entity exists.
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Gone(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PaymentDeclined(String),

    #[error("payment failed: {0}")]
    Payment(String),
}

impl StorefrontError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StorefrontError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            StorefrontError::NotFound => StatusCode::NOT_FOUND,
            StorefrontError::Gone(_) => StatusCode::GONE,
            StorefrontError::Validation(_)
            | StorefrontError::PaymentDeclined(_)
            | StorefrontError::Payment(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StorefrontError::Json(_)
            | StorefrontError::Db(_)
            | StorefrontError::Io(_)
            | StorefrontError::TimeParse(_)
            | StorefrontError::Data(_)
            | StorefrontError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
