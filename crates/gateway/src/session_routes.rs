use {
    axum::{Json, extract::State, http::StatusCode, response::IntoResponse},
    serde_json::Value,
    switchboard_channels::SessionEvent,
};

use crate::server::AppState;

/// Relay a message the agent wants shown in its channel.
pub async fn messages_post(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let channel_id = body
        .get("channelId")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim();
    let text = body
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim();

    if channel_id.is_empty() || text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "channelId and text are required" })),
        )
            .into_response();
    }

    state
        .sink
        .emit(SessionEvent::AgentMessage {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        })
        .await;
    Json(serde_json::json!({ "ok": true })).into_response()
}

/// Snapshot of every live channel session.
pub async fn sessions_list(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "sessions": state.registry.snapshot().await }))
}
