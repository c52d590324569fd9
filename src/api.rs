use axum::{Json, extract::Extension, response::IntoResponse};
use serde_json::json;

use crate::polls::Poll;
use crate::startup::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "Server is running" }))
}

/// Initial-load and reconnect recovery: the running poll with its
/// countdown, or an explicit null so clients can clear stale state.
pub async fn active_poll(Extension(app_state): Extension<AppState>) -> impl IntoResponse {
    match app_state.hub.recovery_poll().await {
        Some((poll, remaining_time)) => Json(json!({
            "success": true,
            "poll": poll,
            "remainingTime": remaining_time,
        })),
        None => Json(json!({ "success": false, "poll": null })),
    }
}

pub async fn poll_history(Extension(app_state): Extension<AppState>) -> Json<Vec<Poll>> {
    Json(app_state.hub.poll_history().await)
}
