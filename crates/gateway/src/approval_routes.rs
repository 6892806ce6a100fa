use std::time::Duration;

use {
    axum::{Json, extract::State, http::StatusCode, response::IntoResponse},
    serde::Deserialize,
    serde_json::Value,
    switchboard_approval::ApprovalResponse,
    tracing::{info, warn},
};

use crate::server::AppState;

fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Deliver a decision for a pending approval.
///
/// Unknown or already resolved ids still answer 200 with `resolved: false`.
pub async fn approvals_respond(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let response: ApprovalResponse = match serde_json::from_value(body) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "malformed approval response");
            return bad_request("body must carry requestId and response or approved");
        },
    };
    let Some(decision) = response.decision() else {
        return bad_request("response must be allow, allow_session or deny");
    };
    let resolved = state
        .approvals
        .resolve_approval(&response.request_id, decision)
        .await;
    info!(request_id = %response.request_id, ?decision, resolved, "approval response received");
    Json(serde_json::json!({ "ok": true, "resolved": resolved })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalRequestBody {
    channel_id: String,
    tool_name: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Register an approval request and hold the connection until it is decided.
pub async fn approvals_request(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let body: ApprovalRequestBody = match serde_json::from_value(body) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "malformed approval request");
            return bad_request("body must carry channelId and toolName");
        },
    };
    if body.channel_id.trim().is_empty() || body.tool_name.trim().is_empty() {
        return bad_request("channelId and toolName are required");
    }
    let request_id = body
        .request_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let decision = state
        .approvals
        .request_approval(
            &body.channel_id,
            &body.tool_name,
            &request_id,
            body.input,
            body.timeout_ms.map(Duration::from_millis),
        )
        .await;
    Json(serde_json::json!({ "requestId": request_id, "decision": decision })).into_response()
}

/// Ids of approvals still waiting for a decision.
pub async fn approvals_pending(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "pending": state.approvals.pending_ids().await }))
}
