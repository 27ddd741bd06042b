//! Item status repository: the persisted publishing log.

use publish_core::{ItemStatus, JobId, ReferenceId, SortField, SortSpec};
use serde::Deserialize;

use crate::{DbError, get_db};

/// Repository for item status records.
///
/// Rows are the serialized [`ItemStatus`] itself; the SurrealDB record id
/// is the reference id and is ignored on read.
pub struct ItemStatusRepository;

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    reference_id: ReferenceId,
}

impl ItemStatusRepository {
    /// Write a record keyed by its reference id.
    ///
    /// Writing the same record twice leaves a single row.
    pub async fn save(status: &ItemStatus) -> Result<ItemStatus, DbError> {
        let db = get_db()?;
        let key = status.reference_id().to_string();

        let record: Option<ItemStatus> = db
            .upsert(("item_status", key))
            .content(status.clone())
            .await?;

        record.ok_or_else(|| {
            DbError::Query(format!(
                "Failed to save item status {}",
                status.reference_id()
            ))
        })
    }

    /// Get every record among `reference_ids` that exists. Order is not
    /// guaranteed.
    pub async fn get_many(reference_ids: &[ReferenceId]) -> Result<Vec<ItemStatus>, DbError> {
        if reference_ids.is_empty() {
            return Ok(Vec::new());
        }
        let db = get_db()?;
        let ids: Vec<i64> = reference_ids.iter().map(|id| id.0).collect();

        let mut result = db
            .query("SELECT * FROM item_status WHERE reference_id IN $ids")
            .bind(("ids", ids))
            .await?;

        let records: Vec<ItemStatus> = result.take(0)?;

        Ok(records)
    }

    /// Reference ids of a job's records, ordered by `sort` with ties broken
    /// by ascending reference id.
    pub async fn find_reference_ids_for_job(
        job_id: JobId,
        sort: SortSpec,
    ) -> Result<Vec<ReferenceId>, DbError> {
        let db = get_db()?;
        let column = sort.field.column();
        let direction = sort.direction.keyword();

        // Column names come from a closed enum, never from caller input.
        let query = if sort.field == SortField::ReferenceId {
            format!(
                "SELECT reference_id FROM item_status WHERE job_id = $job_id \
                 ORDER BY reference_id {direction}"
            )
        } else {
            format!(
                "SELECT reference_id, {column} FROM item_status WHERE job_id = $job_id \
                 ORDER BY {column} {direction}, reference_id ASC"
            )
        };

        let mut result = db.query(&query).bind(("job_id", job_id.0)).await?;
        let rows: Vec<ReferenceRow> = result.take(0)?;

        Ok(rows.into_iter().map(|row| row.reference_id).collect())
    }
}
