//! Identifier types and the process-wide allocators that mint them.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Lock-free monotonic counter handing out `i64` identifiers.
///
/// Values are never repeated for the lifetime of the allocator. The global
/// allocators are seeded from the wall clock at first use so identifiers are
/// also effectively non-repeating across process restarts.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    /// Create an allocator whose first id is `first`.
    pub const fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    /// Create an allocator seeded with the current epoch milliseconds.
    pub fn seeded() -> Self {
        Self::starting_at(Utc::now().timestamp_millis().max(1))
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

static REQUEST_IDS: LazyLock<IdAllocator> = LazyLock::new(IdAllocator::seeded);
static REFERENCE_IDS: LazyLock<IdAllocator> = LazyLock::new(IdAllocator::seeded);

/// Identifier of a publishing job. Supplied by the caller that starts the job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Identifier of a submitted work unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl RequestId {
    /// Allocate a fresh request id from the process-wide counter.
    pub fn next() -> Self {
        Self(REQUEST_IDS.next_id())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single item status record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReferenceId(pub i64);

impl ReferenceId {
    /// Allocate a fresh reference id from the process-wide counter.
    pub fn next() -> Self {
        Self(REFERENCE_IDS.next_id())
    }
}

impl std::fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
