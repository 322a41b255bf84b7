//! Health endpoints for the container health check and orchestrators.
//!
//! `/health` reports the store connection and answers 503 when it is down.
//! `/health/ready` and `/health/live` are the readiness and liveness probes.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overall health with per-service status.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store unreachable");
            false
        }
    };
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "healthy" } else { "unhealthy" },
            "version": VERSION,
            "timestamp": Utc::now().to_rfc3339(),
            "services": {
                "database": if database { "connected" } else { "disconnected" },
                "storage": state.store.backend(),
                "queue": { "pending": state.queue.len() },
            },
        })),
    )
}

/// Readiness: the store must answer.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "not ready", "reason": "Database not available" })),
            )
        }
    }
}

/// Liveness: the process can answer HTTP.
pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}
