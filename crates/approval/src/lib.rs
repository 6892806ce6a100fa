//! Out-of-band approval requests for agent tool calls.
//!
//! A sidecar registers a request and waits; a human decision arrives later
//! through [`ApprovalCoordinator::resolve_approval`]. No decision within the
//! timeout means deny.

pub mod coordinator;
pub mod decision;

pub use {
    coordinator::{ApprovalCoordinator, ApprovalNotice, ApprovalNotifier, SessionAllowlist},
    decision::{ApprovalDecision, ApprovalResponse, approval_target},
};
