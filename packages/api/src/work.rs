//! Demand-publish work submission.

use std::time::Duration;

use actors::{CoordinationError, SupervisorMessage};
use publish_core::{FolderContent, RequestId, WorkUnit};

use crate::init::request;
use crate::{ApiError, ApiResult};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Submit items for publishing, returning the request id a START can claim.
pub async fn submit_work(items: Vec<FolderContent>) -> ApiResult<RequestId> {
    submit_unit(WorkUnit::new(items)).await
}

/// Submit a prepared work unit.
///
/// Waits with backoff while the dispatch queue is full. The unit keeps its
/// request id across retries.
pub async fn submit_unit(unit: WorkUnit) -> ApiResult<RequestId> {
    let request_id = unit.request_id();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let attempt = unit.clone();
        match request(|reply| SupervisorMessage::SubmitWork {
            unit: attempt,
            reply,
        })
        .await?
        {
            Ok(()) => {
                tracing::debug!("Submitted work unit {} ({} items)", request_id, unit.len());
                return Ok(request_id);
            }
            Err(e) if CoordinationError::is_queue_full(&e) => {
                tracing::debug!(
                    "Dispatch queue full, retrying work unit {} in {:?}",
                    request_id,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(ApiError::Coordinator(e)),
        }
    }
}
