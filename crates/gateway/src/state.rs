use std::sync::Arc;

use {
    switchboard_approval::ApprovalCoordinator,
    switchboard_channels::{ChannelRegistry, EventSink},
};

/// Shared state behind every route.
pub struct GatewayState {
    pub registry: Arc<ChannelRegistry>,
    pub approvals: Arc<ApprovalCoordinator>,
    /// Where agent messages are delivered.
    pub sink: Arc<dyn EventSink>,
    /// Server version string.
    pub version: String,
}

impl GatewayState {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        approvals: Arc<ApprovalCoordinator>,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            approvals,
            sink,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
