//! Job control and status calls.

use actors::{QueueStats, SupervisorMessage};
use publish_core::{ItemStatus, JobId, JobStatus, ReferenceId, SortSpec, StartJob};

use crate::ApiResult;
use crate::init::request;

/// Open a job.
///
/// When `start` names a work unit, that unit's items become the job's items.
pub async fn start_job(start: StartJob) -> ApiResult<()> {
    tracing::debug!("Starting job {}", start.job_id());
    request(|reply| SupervisorMessage::StartJob {
        start: Box::new(start),
        reply,
    })
    .await??;
    Ok(())
}

/// Close a job. Results arriving afterwards are not counted.
pub async fn end_job(job_id: JobId) -> ApiResult<()> {
    tracing::debug!("Ending job {}", job_id);
    request(|reply| SupervisorMessage::EndJob { job_id, reply }).await??;
    Ok(())
}

/// Cancel a job.
///
/// Fire-and-forget: poll [`get_job_status`] to observe the outcome.
/// Cancelling an unknown or finished job does nothing.
pub async fn cancel_job(job_id: JobId) -> ApiResult<()> {
    tracing::debug!("Cancelling job {}", job_id);
    request(|reply| SupervisorMessage::CancelJob { job_id, reply }).await??;
    Ok(())
}

/// Live status of an open job, or the persisted status of a finished one.
pub async fn get_job_status(job_id: JobId) -> ApiResult<Option<JobStatus>> {
    Ok(request(|reply| SupervisorMessage::GetJobStatus { job_id, reply }).await??)
}

/// Persisted item records. Unknown reference ids are skipped.
pub async fn get_item_status(reference_ids: Vec<ReferenceId>) -> ApiResult<Vec<ItemStatus>> {
    Ok(request(|reply| SupervisorMessage::GetItemStatus {
        reference_ids,
        reply,
    })
    .await??)
}

/// Reference ids of a job's persisted records in `sort` order.
pub async fn find_reference_ids_for_job(
    job_id: JobId,
    sort: SortSpec,
) -> ApiResult<Vec<ReferenceId>> {
    Ok(request(|reply| SupervisorMessage::FindReferenceIds {
        job_id,
        sort,
        reply,
    })
    .await??)
}

/// Feed an outcome produced outside the worker pool into the pipeline.
pub async fn report_item_status(status: ItemStatus) -> ApiResult<()> {
    request(|reply| SupervisorMessage::ReportItem {
        status: Box::new(status),
        reply,
    })
    .await??;
    Ok(())
}

pub async fn queue_stats() -> ApiResult<QueueStats> {
    Ok(request(|reply| SupervisorMessage::GetQueueStats { reply }).await??)
}
