//! LINE webhook receiver.
//!
//! The handler verifies `X-Line-Signature` over the raw body, turns each
//! event into a job and queues it. Processing happens in the worker pool so
//! LINE gets its `200 OK` immediately.

use axum::{body::Bytes, extract::State, http::HeaderMap};

use crate::error::AppError;
use crate::jobs::Job;
use crate::services::line::{verify_signature, WebhookPayload};
use crate::state::AppState;

pub const LINE_SIGNATURE_HEADER: &str = "x-line-signature";

pub async fn line(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, AppError> {
    let secret = state
        .config
        .line
        .channel_secret
        .as_deref()
        .ok_or(AppError::LineNotConfigured)?;

    let signature = headers
        .get(LINE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        return Err(AppError::InvalidSignature);
    }

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidPayload(e.to_string()))?;

    let mut queued = 0;
    for event in &payload.events {
        let Some(job) = Job::from_event(event) else {
            tracing::debug!(kind = %event.kind, "Ignoring webhook event");
            continue;
        };
        if event.is_redelivery() {
            tracing::debug!(event_id = ?event.webhook_event_id, "Redelivered webhook event");
        }
        if state
            .queue
            .submit(event.webhook_event_id.as_deref(), job)
            .await?
        {
            queued += 1;
        }
    }

    tracing::info!(events = payload.events.len(), queued, "Webhook accepted");
    Ok("OK")
}
