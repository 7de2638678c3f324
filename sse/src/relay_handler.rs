use crate::Manager;
use async_trait::async_trait;
use events::{Event, EventHandler};
use log::*;
use std::sync::Arc;

/// Relays every decoded inbound event to all open SSE connections.
pub struct SseRelayHandler {
    sse_manager: Arc<Manager>,
}

impl SseRelayHandler {
    pub fn new(sse_manager: Arc<Manager>) -> Self {
        Self { sse_manager }
    }
}

#[async_trait]
impl EventHandler for SseRelayHandler {
    async fn handle(&self, event: &Event) {
        let report = self.sse_manager.broadcast(event).await;
        debug!(
            "Broadcast event {} to {} connection(s), {} failed",
            report.event_id, report.delivered, report.failed
        );
    }
}
