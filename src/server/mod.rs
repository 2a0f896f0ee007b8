pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::Router;

use crate::catalog::CatalogStore;
use crate::config::Settings;
use crate::customers::CustomerStore;
use crate::error::{Result as AppResult, StorefrontError};
use crate::orders::OrderStore;
use crate::payments::PaymentProcessor;
use crate::payments::stripe::StripeGateway;
use crate::pending_orders::PendingOrderStore;
use crate::schedule::ScheduleStore;
use crate::sessions::SessionStore;
use crate::storage::Database;

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub customers: Arc<dyn CustomerStore + Send + Sync>,
    pub sessions: Arc<dyn SessionStore + Send + Sync>,
    pub catalog: Arc<dyn CatalogStore + Send + Sync>,
    pub orders: Arc<dyn OrderStore + Send + Sync>,
    pub schedules: Arc<dyn ScheduleStore + Send + Sync>,
    pub pending_orders: Arc<dyn PendingOrderStore + Send + Sync>,
    pub payments: Arc<dyn PaymentProcessor + Send + Sync>,
    /// Seals the confirm/edit links sent in reorder emails.
    pub link_secret: Vec<u8>,
}

fn env_required(name: &'static str) -> AppResult<String> {
    std::env::var(name)
        .map_err(|_| StorefrontError::Config(format!("missing env `{}`", name)))
}

pub async fn create_app(config: Settings) -> AppResult<Router> {
    let link_secret = env_required("SF_LINK_TOKEN_SECRET")?.into_bytes();
    let payments = Arc::new(StripeGateway::from_env()?);

    let database = Arc::new(Database::new(&config.database.path).await?);

    let app_state = AppState {
        config,
        customers: database.clone(),
        sessions: database.clone(),
        catalog: database.clone(),
        orders: database.clone(),
        schedules: database.clone(),
        pending_orders: database.clone(),
        payments,
        link_secret,
    };

    let app = handlers::routes().with_state(Arc::new(app_state));

    use axum::http::{Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};
    use tower_http::trace::TraceLayer;
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true);

    Ok(app.layer(cors).layer(TraceLayer::new_for_http()))
}
