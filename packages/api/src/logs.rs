//! Paged access to a job's publishing log.
//!
//! Cursors live in a process-wide registry and are addressed by
//! [`CursorId`], so callers only hold an id between page requests. Cursors
//! left idle past `cursor_idle_secs` are closed by the coordinator's sweep.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use db::{PageEntry, PublishLogCursor};
use parking_lot::Mutex;
use publish_core::{JobId, SortSpec};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use ulid::Ulid;

use crate::init::log_context;
use crate::{ApiError, ApiResult};

/// Handle to an open log cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorId(pub Ulid);

impl CursorId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CursorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CursorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type SharedCursor = Arc<tokio::sync::Mutex<PublishLogCursor>>;

struct OpenCursor {
    cursor: SharedCursor,
    last_used: Instant,
}

static CURSORS: LazyLock<Mutex<HashMap<CursorId, OpenCursor>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn cursor(id: CursorId) -> ApiResult<SharedCursor> {
    let mut cursors = CURSORS.lock();
    let open = cursors.get_mut(&id).ok_or(ApiError::CursorNotFound(id))?;
    open.last_used = Instant::now();
    Ok(open.cursor.clone())
}

/// Open a cursor over `job_id`'s records in `sort` order.
pub fn open_cursor(job_id: JobId, sort: SortSpec) -> CursorId {
    let (store, max_page_size) = log_context();
    let id = CursorId::new();
    let cursor = PublishLogCursor::new(store, job_id, sort, max_page_size);
    CURSORS.lock().insert(
        id,
        OpenCursor {
            cursor: Arc::new(tokio::sync::Mutex::new(cursor)),
            last_used: Instant::now(),
        },
    );
    tracing::debug!("Opened log cursor {} for job {}", id, job_id);
    id
}

/// Entries `start..=end` of the cursor's ordering.
pub async fn page(id: CursorId, start: usize, end: usize) -> ApiResult<Vec<PageEntry>> {
    let cursor = cursor(id)?;
    let mut cursor = cursor.lock().await;
    Ok(cursor.page(start, end).await?)
}

/// Number of records in the cursor's ordering.
pub async fn cursor_count(id: CursorId) -> ApiResult<usize> {
    let cursor = cursor(id)?;
    let mut cursor = cursor.lock().await;
    Ok(cursor.count().await?)
}

/// Change the sort order, dropping the cached ordering.
pub async fn set_cursor_sort(id: CursorId, sort: SortSpec) -> ApiResult<()> {
    cursor(id)?.lock().await.set_sort(sort);
    Ok(())
}

/// Drop the cached ordering so the next page sees newly written records.
pub async fn refresh_cursor(id: CursorId) -> ApiResult<()> {
    cursor(id)?.lock().await.invalidate();
    Ok(())
}

/// Close a cursor. Returns whether it was open.
pub fn close_cursor(id: CursorId) -> bool {
    CURSORS.lock().remove(&id).is_some()
}

/// Close every cursor not used for `max_idle`. Returns how many closed.
pub fn evict_idle_cursors(max_idle: Duration) -> usize {
    let mut cursors = CURSORS.lock();
    let before = cursors.len();
    cursors.retain(|_, open| open.last_used.elapsed() < max_idle);
    let evicted = before - cursors.len();
    if evicted > 0 {
        tracing::debug!("Closed {} idle log cursors", evicted);
    }
    evicted
}
