//! Paged, sorted view over a job's publishing log.

use std::collections::HashMap;
use std::sync::Arc;

use publish_core::{ItemStatus, JobId, ReferenceId, SortSpec};
use serde::{Deserialize, Serialize};

use crate::{DbError, PublishLogStore};

/// One slot of a requested page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEntry {
    Available {
        index: usize,
        status: Box<ItemStatus>,
    },
    /// Index outside the log, or a record no longer in the store.
    NotAvailable { index: usize },
}

impl PageEntry {
    pub fn index(&self) -> usize {
        match self {
            PageEntry::Available { index, .. } | PageEntry::NotAvailable { index } => *index,
        }
    }

    pub fn status(&self) -> Option<&ItemStatus> {
        match self {
            PageEntry::Available { status, .. } => Some(status),
            PageEntry::NotAvailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PageEntry::Available { .. })
    }
}

/// Cursor over one job's records in a chosen order.
///
/// The ordered reference id list is fetched on first use and cached; pages
/// are slices of that cached ordering. Changing the job or the sort spec
/// drops the cache and the current page.
pub struct PublishLogCursor {
    store: Arc<dyn PublishLogStore>,
    job_id: JobId,
    sort: SortSpec,
    max_page_size: usize,
    ordering: Option<Vec<ReferenceId>>,
    current_page: Vec<PageEntry>,
}

impl std::fmt::Debug for PublishLogCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishLogCursor")
            .field("job_id", &self.job_id)
            .field("sort", &self.sort)
            .field("max_page_size", &self.max_page_size)
            .field("cached", &self.ordering.as_ref().map(Vec::len))
            .finish()
    }
}

impl PublishLogCursor {
    pub fn new(
        store: Arc<dyn PublishLogStore>,
        job_id: JobId,
        sort: SortSpec,
        max_page_size: usize,
    ) -> Self {
        Self {
            store,
            job_id,
            sort,
            max_page_size: max_page_size.max(1),
            ordering: None,
            current_page: Vec::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Point the cursor at another job.
    pub fn set_job(&mut self, job_id: JobId) {
        if job_id != self.job_id {
            self.job_id = job_id;
            self.invalidate();
        }
    }

    /// Change the ordering.
    pub fn set_sort(&mut self, sort: SortSpec) {
        if sort != self.sort {
            self.sort = sort;
            self.invalidate();
        }
    }

    /// Forget the cached ordering so the next read refetches it.
    pub fn invalidate(&mut self) {
        self.ordering = None;
        self.current_page.clear();
    }

    /// The page returned by the last call to [`page`](Self::page).
    pub fn current_page(&self) -> &[PageEntry] {
        &self.current_page
    }

    /// Number of records in the cached ordering, fetching it if needed.
    pub async fn count(&mut self) -> Result<usize, DbError> {
        Ok(self.ordering().await?.len())
    }

    async fn ordering(&mut self) -> Result<&[ReferenceId], DbError> {
        if self.ordering.is_none() {
            let ids = self
                .store
                .reference_ids_for_job(self.job_id, self.sort)
                .await?;
            tracing::debug!(
                "Cached {} reference ids for job {} ordered by {:?}",
                ids.len(),
                self.job_id,
                self.sort
            );
            self.ordering = Some(ids);
        }
        Ok(self.ordering.as_deref().unwrap_or_default())
    }

    /// Records at indices `start..=end` of the cached ordering.
    ///
    /// The range is truncated to the configured page size. Indices past the
    /// end of the log, and records missing from the store, come back as
    /// [`PageEntry::NotAvailable`]. An inverted range yields an empty page.
    pub async fn page(&mut self, start: usize, end: usize) -> Result<Vec<PageEntry>, DbError> {
        if end < start {
            self.current_page.clear();
            return Ok(Vec::new());
        }
        let end = end.min(start.saturating_add(self.max_page_size - 1));

        let wanted: Vec<(usize, Option<ReferenceId>)> = {
            let ordering = self.ordering().await?;
            (start..=end)
                .map(|index| (index, ordering.get(index).copied()))
                .collect()
        };

        let ids: Vec<ReferenceId> = wanted.iter().filter_map(|(_, id)| *id).collect();
        let mut found: HashMap<ReferenceId, ItemStatus> = self
            .store
            .items(ids)
            .await?
            .into_iter()
            .map(|status| (status.reference_id(), status))
            .collect();

        let entries: Vec<PageEntry> = wanted
            .into_iter()
            .map(|(index, id)| match id.and_then(|id| found.remove(&id)) {
                Some(status) => PageEntry::Available {
                    index,
                    status: Box::new(status),
                },
                None => PageEntry::NotAvailable { index },
            })
            .collect();

        self.current_page = entries.clone();
        Ok(entries)
    }
}
