use axum::routing::{get, post};
use axum::Router;
use engine::Config;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;

mod dto;
mod error;
mod handlers;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("../engine/migrations").run(&pool).await?;

    let app_state = AppState { pool };

    let app = Router::new()
        .route("/orders", post(handlers::admit_order).get(handlers::query_orders))
        .route("/orders/:order_id/place", post(handlers::place_order))
        .route("/orders/:order_id/cancel", post(handlers::cancel_order))
        .route("/contracts", post(handlers::issue_contract))
        .route("/contracts/:contract_id/cancel", post(handlers::cancel_contract))
        .route("/contracts/:contract_id/expire", post(handlers::expire_contract))
        .route("/instruments", get(handlers::query_instruments))
        .with_state(app_state);

    let listener = TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
