//! Storage seam for the publishing log.
//!
//! The coordinator only needs a handful of operations from storage, so they
//! are collected behind [`PublishLogStore`]. [`SurrealLogStore`] goes through
//! the repositories; [`MemoryLogStore`] keeps everything in process and is
//! what the actor tests run against.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use parking_lot::RwLock;
use publish_core::{ItemStatus, JobId, JobStatus, ReferenceId, SortSpec};

use crate::DbError;
use crate::repositories::{ItemStatusRepository, JobStatusRepository};

/// Future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DbError>> + Send + 'a>>;

/// Persistence operations used by the coordinator and the log cursor.
pub trait PublishLogStore: Send + Sync + 'static {
    /// Persist an item status record keyed by its reference id.
    fn save_item(&self, status: ItemStatus) -> StoreFuture<'_, ()>;

    /// Persist a job aggregate keyed by its job id.
    fn save_job(&self, status: JobStatus) -> StoreFuture<'_, ()>;

    /// Fetch the records among `reference_ids` that exist, in any order.
    fn items(&self, reference_ids: Vec<ReferenceId>) -> StoreFuture<'_, Vec<ItemStatus>>;

    /// Fetch a persisted job aggregate.
    fn job(&self, job_id: JobId) -> StoreFuture<'_, Option<JobStatus>>;

    /// Reference ids of a job's records in `sort` order.
    fn reference_ids_for_job(
        &self,
        job_id: JobId,
        sort: SortSpec,
    ) -> StoreFuture<'_, Vec<ReferenceId>>;
}

/// Store backed by the global SurrealDB connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurrealLogStore;

impl SurrealLogStore {
    pub fn new() -> Self {
        Self
    }
}

impl PublishLogStore for SurrealLogStore {
    fn save_item(&self, status: ItemStatus) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            ItemStatusRepository::save(&status).await?;
            Ok(())
        })
    }

    fn save_job(&self, status: JobStatus) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            JobStatusRepository::save(&status).await?;
            Ok(())
        })
    }

    fn items(&self, reference_ids: Vec<ReferenceId>) -> StoreFuture<'_, Vec<ItemStatus>> {
        Box::pin(async move { ItemStatusRepository::get_many(&reference_ids).await })
    }

    fn job(&self, job_id: JobId) -> StoreFuture<'_, Option<JobStatus>> {
        Box::pin(async move {
            match JobStatusRepository::get(job_id).await {
                Ok(status) => Ok(Some(status)),
                Err(DbError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    fn reference_ids_for_job(
        &self,
        job_id: JobId,
        sort: SortSpec,
    ) -> StoreFuture<'_, Vec<ReferenceId>> {
        Box::pin(async move { ItemStatusRepository::find_reference_ids_for_job(job_id, sort).await })
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    items: RwLock<HashMap<ReferenceId, ItemStatus>>,
    jobs: RwLock<HashMap<JobId, JobStatus>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of item records held.
    pub fn item_count(&self) -> usize {
        self.items.read().len()
    }

    /// Drop a record, as if it had been purged from the log.
    pub fn remove_item(&self, reference_id: ReferenceId) -> Option<ItemStatus> {
        self.items.write().remove(&reference_id)
    }
}

impl PublishLogStore for MemoryLogStore {
    fn save_item(&self, status: ItemStatus) -> StoreFuture<'_, ()> {
        self.items.write().insert(status.reference_id(), status);
        Box::pin(async { Ok(()) })
    }

    fn save_job(&self, status: JobStatus) -> StoreFuture<'_, ()> {
        self.jobs.write().insert(status.job_id, status);
        Box::pin(async { Ok(()) })
    }

    fn items(&self, reference_ids: Vec<ReferenceId>) -> StoreFuture<'_, Vec<ItemStatus>> {
        let items = self.items.read();
        let found = reference_ids
            .iter()
            .filter_map(|id| items.get(id).cloned())
            .collect();
        Box::pin(async move { Ok(found) })
    }

    fn job(&self, job_id: JobId) -> StoreFuture<'_, Option<JobStatus>> {
        let found = self.jobs.read().get(&job_id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn reference_ids_for_job(
        &self,
        job_id: JobId,
        sort: SortSpec,
    ) -> StoreFuture<'_, Vec<ReferenceId>> {
        let mut records: Vec<ItemStatus> = self
            .items
            .read()
            .values()
            .filter(|status| status.job_id() == job_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| sort.compare(a, b));
        let ids = records.iter().map(ItemStatus::reference_id).collect();
        Box::pin(async move { Ok(ids) })
    }
}
