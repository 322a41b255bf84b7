//! HTTP routes.
//!
//! The surface is small: a banner at `/`, health probes under `/health`,
//! and the LINE webhook. Health responses are never cached so probes always
//! see the current state.
//!
//! Request tracing is enabled via middleware that generates a unique request ID
//! for each incoming request, allowing correlation of all logs within a request.

pub mod health;
pub mod root;
pub mod webhook;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CACHE_CONTROL_NO_STORE;
use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the Axum router with all routes and layers.
pub fn create_router(state: AppState) -> Router {
    // `/health/` is what the container health check probes
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        ));

    let webhook_routes = Router::new().route("/webhook/line", post(webhook::line));

    Router::new()
        .route("/", get(root::index))
        .merge(health_routes)
        .merge(webhook_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
