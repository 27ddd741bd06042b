//! Real-time event streaming.

use actors::SupervisorMessage;
use publish_core::PublishEvent;
use tokio::sync::broadcast;

use crate::init::supervisor;
use crate::{ApiError, ApiResult};

/// Subscribe to the coordinator's event stream.
pub fn subscribe() -> ApiResult<broadcast::Receiver<PublishEvent>> {
    let (tx, rx) = broadcast::channel(1024);
    supervisor()?
        .send_message(SupervisorMessage::Subscribe { sender: tx })
        .map_err(|e| ApiError::Send(e.to_string()))?;
    Ok(rx)
}

/// Helper to format an event for SSE.
pub fn format_sse_event(event: &PublishEvent) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}
