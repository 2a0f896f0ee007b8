mod catalog;
mod config;
mod confirmation;
mod customers;
mod error;
mod link_tokens;
mod notifications;
mod orders;
mod payments;
mod pending_orders;
mod schedule;
mod server;
mod sessions;
mod snapshot;
mod storage;
mod sweeps;

use tracing_subscriber::fmt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    fmt::init();

    let config = config::Settings::load()?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = server::create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Storefront server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
