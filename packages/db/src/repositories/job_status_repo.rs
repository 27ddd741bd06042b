//! Job status repository for final job aggregates.

use publish_core::{JobId, JobStatus};

use crate::{DbError, get_db};

/// Repository for job status persistence operations.
pub struct JobStatusRepository;

impl JobStatusRepository {
    /// Insert or replace the row for `status.job_id`.
    pub async fn save(status: &JobStatus) -> Result<JobStatus, DbError> {
        let db = get_db()?;

        let record: Option<JobStatus> = db
            .upsert(("job_status", status.job_id.to_string()))
            .content(status.clone())
            .await?;

        record
            .ok_or_else(|| DbError::Query(format!("Failed to save job status {}", status.job_id)))
    }

    /// Get a job's status by ID.
    pub async fn get(job_id: JobId) -> Result<JobStatus, DbError> {
        let db = get_db()?;

        let record: Option<JobStatus> =
            db.select(("job_status", job_id.to_string())).await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job status not found: {}", job_id)))
    }
}
