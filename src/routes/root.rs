use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::health::VERSION;
use crate::state::AppState;

/// Service banner
pub async fn index(State(state): State<AppState>) -> Json<Value> {
    let name = &state.config.app.name;
    Json(json!({
        "service": name,
        "message": format!("{} APIサーバー稼働中", name),
        "version": VERSION,
    }))
}
