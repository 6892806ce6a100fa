use std::{future::Future, sync::Arc};

use {
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{approval_routes, session_routes, state::GatewayState};

// ── Shared app state ─────────────────────────────────────────────────────────

pub type AppState = Arc<GatewayState>;

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/approvals", get(approval_routes::approvals_pending))
        .route(
            "/api/approvals/request",
            post(approval_routes::approvals_request),
        )
        .route(
            "/api/approvals/respond",
            post(approval_routes::approvals_respond),
        )
        .route("/api/messages", post(session_routes::messages_post))
        .route("/api/sessions", get(session_routes::sessions_list))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn start_gateway(
    bind: &str,
    port: u16,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_gateway_app(state);
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "sessions": state.registry.len(),
        "pendingApprovals": state.approvals.pending_count().await,
    }))
}
