mod config;
mod models;
mod services;
mod utils;
mod web;

use config::Config;
use services::api::ApiClient;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::from_env();
    tracing::info!(backend = %config.backend_url, "Using writing-assistant backend");

    let backend = Arc::new(ApiClient::new(config.backend_url.clone()));
    let bind_addr = config.bind_addr.clone();
    let app_state = web::AppState::new(backend, config);

    let app = web::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        );

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
