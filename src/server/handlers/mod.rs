use axum::{
    Router,
    routing::{get, patch, post},
};
use std::sync::Arc;

use crate::server::AppState;

mod auth;
mod orders;
mod pending_orders;
mod schedules;
mod sweeps;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        // Customer auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        // Reorder schedules (owner-authenticated)
        .route(
            "/reorder-schedules",
            get(schedules::index).post(schedules::create),
        )
        .route(
            "/reorder-schedules/{id}",
            get(schedules::show)
                .patch(schedules::update)
                .delete(schedules::cancel),
        )
        .route("/reorder-schedules/{id}/pause", post(schedules::pause))
        .route("/reorder-schedules/{id}/resume", post(schedules::resume))
        .route(
            "/reorder-schedules/{id}/skip-next",
            post(schedules::skip_next),
        )
        // Orders (owner-authenticated)
        .route("/orders", get(orders::index))
        .route("/orders/{id}", get(orders::show))
        // Pending orders (signed-link access, no login)
        .route(
            "/pending-orders/{id}/confirm",
            post(pending_orders::confirm),
        )
        .route("/pending-orders/{id}/edit", get(pending_orders::edit))
        .route("/pending-orders/{id}", patch(pending_orders::update))
        // Sweep triggers for the external scheduler
        .route(
            "/internal/sweeps/pending-orders",
            post(sweeps::run_pending_order_sweep),
        )
        .route("/internal/sweeps/expiry", post(sweeps::run_expiry_sweep))
}
