//! HTTP surface for sidecars and the agent.
//!
//! Approval requests and decisions, free-form agent messages, a session
//! listing, and a health check.

pub mod approval_routes;
pub mod server;
pub mod session_routes;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
