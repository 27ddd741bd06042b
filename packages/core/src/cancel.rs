//! Cancellation notices and the shared set of live notices.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Default time after which a cancellation notice may be forgotten.
pub const DISCARD_WINDOW_SECS: i64 = 24 * 60 * 60;

/// The default discard window as a [`TimeDelta`].
pub fn discard_window() -> TimeDelta {
    TimeDelta::seconds(DISCARD_WINDOW_SECS)
}

/// Source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Notice that a job has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationNotice {
    pub job_id: JobId,
    pub issued_at: DateTime<Utc>,
}

impl CancellationNotice {
    /// Capture a notice at the current wall-clock time.
    pub fn new(job_id: JobId) -> Self {
        Self::issued_at(job_id, Utc::now())
    }

    pub fn issued_at(job_id: JobId, issued_at: DateTime<Utc>) -> Self {
        Self { job_id, issued_at }
    }

    /// True once more than the default discard window has elapsed.
    pub fn should_discard(&self) -> bool {
        self.should_discard_at(Utc::now(), discard_window())
    }

    /// True iff `now - issued_at > window`.
    pub fn should_discard_at(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        now - self.issued_at > window
    }
}

/// Concurrent set of cancellation notices keyed by job.
///
/// A job counts as cancelled while its notice is inside the discard window.
/// Once [`sweep`](Self::sweep) drops a notice, late messages for that job are
/// processed normally again.
#[derive(Debug)]
pub struct CancellationRegistry {
    notices: RwLock<HashMap<JobId, CancellationNotice>>,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl CancellationRegistry {
    pub fn new(window: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            notices: RwLock::new(HashMap::new()),
            window,
            clock,
        }
    }

    /// Registry using the default window and the system clock.
    pub fn with_defaults() -> Self {
        Self::new(discard_window(), Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Issue a notice for `job_id` at the registry's current time.
    ///
    /// A job that already has a live notice keeps the original one, so
    /// cancelling twice behaves like cancelling once.
    pub fn cancel(&self, job_id: JobId) -> CancellationNotice {
        self.insert(CancellationNotice::issued_at(job_id, self.clock.now()))
    }

    /// Record a notice received from elsewhere, returning the one now held.
    pub fn insert(&self, notice: CancellationNotice) -> CancellationNotice {
        let now = self.clock.now();
        let mut notices = self.notices.write();
        match notices.get(&notice.job_id) {
            Some(existing) if !existing.should_discard_at(now, self.window) => *existing,
            _ => {
                notices.insert(notice.job_id, notice);
                notice
            }
        }
    }

    /// True while a non-discardable notice exists for `job_id`.
    pub fn is_cancelled(&self, job_id: JobId) -> bool {
        let now = self.clock.now();
        self.notices
            .read()
            .get(&job_id)
            .is_some_and(|notice| !notice.should_discard_at(now, self.window))
    }

    pub fn notice(&self, job_id: JobId) -> Option<CancellationNotice> {
        self.notices.read().get(&job_id).copied()
    }

    /// Drop every discardable notice, returning the affected jobs.
    pub fn sweep(&self) -> Vec<JobId> {
        let now = self.clock.now();
        let mut removed = Vec::new();
        self.notices.write().retain(|job_id, notice| {
            let keep = !notice.should_discard_at(now, self.window);
            if !keep {
                removed.push(*job_id);
            }
            keep
        });
        if !removed.is_empty() {
            tracing::debug!("Swept {} cancellation notices", removed.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.notices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.read().is_empty()
    }
}
