use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::services::ServeDir; // STATIC FILES: expense form client
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod state;
pub mod utils;

use api::create_api_router;
use observability::{health_check, metrics_handler, metrics_middleware};
use security::{get_cors_layer, security_headers_middleware};
use state::AppState;

use axum::middleware as axum_middleware;

pub fn create_app_router(app_state: Arc<AppState>) -> Router {
    let server = &app_state.config.server;

    Router::new()
        // Operational endpoints
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // API endpoints
        .merge(create_api_router())
        // Everything else is the form client
        .fallback_service(ServeDir::new(&server.static_dir))
        .with_state(app_state.clone())
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(get_cors_layer(&server.cors_origins))
        .layer(axum_middleware::from_fn(security_headers_middleware))
}
