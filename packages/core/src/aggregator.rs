//! Job status aggregation.
//!
//! [`JobStatusAggregator`] turns control messages and item status records
//! into per-job counters and lifecycle state. It is shared between every
//! consumer of the dispatch queue:
//!
//! - the outer map is behind an `RwLock` and only write-locked to add or
//!   evict a job;
//! - each job sits behind its own `Mutex`, so updates to one job are
//!   serialized while different jobs progress in parallel;
//! - item records that arrive before their job's START are parked in a
//!   bounded orphan buffer for a grace window instead of creating an
//!   aggregate.
//!
//! Lock order is orphans, then jobs, then a single job entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};

use crate::{
    CancellationNotice, CancellationRegistry, Clock, CoordinatorConfig, ItemState, ItemStatus,
    JobId, JobState, JobStatus, ReferenceId, StartJob,
};

/// What happened to an item status record handed to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDisposition {
    /// Counted. Carries the lifecycle transition it caused, if any.
    Counted {
        transition: Option<(JobState, JobState)>,
    },
    /// Dropped because the job has a live cancellation notice.
    Discarded,
    /// Arrived after END; logged, not counted.
    Straggler,
    /// The reference id was already counted for this job.
    Duplicate,
    /// No START seen yet; held until START or the grace window expires.
    Buffered,
    /// No START seen and the orphan buffer for the job is full.
    Ignored,
}

impl ItemDisposition {
    pub fn is_counted(&self) -> bool {
        matches!(self, ItemDisposition::Counted { .. })
    }
}

/// Result of applying a START.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A new aggregate was created. Orphans buffered for the job were
    /// replayed in arrival order.
    Started {
        status: JobStatus,
        replayed: Vec<(ItemStatus, ItemDisposition)>,
    },
    /// The job already had an aggregate; the START was ignored.
    Duplicate,
}

/// Result of applying an END.
#[derive(Debug, Clone)]
pub enum EndOutcome {
    /// Nothing was waiting on a transactional sink; the job is committed.
    Committed(JobStatus),
    /// Prepared results must be committed before the job is final. Call
    /// [`JobStatusAggregator::complete_commit`] once the sinks are done.
    Committing {
        status: JobStatus,
        prepared: Vec<ItemStatus>,
    },
    /// The job had a live cancellation notice; prepared results must be
    /// rolled back.
    Cancelled {
        status: JobStatus,
        rolled_back: Vec<ItemStatus>,
    },
    /// END was already seen for this job.
    AlreadyEnded(JobState),
    /// No START has been seen for this job.
    Unknown,
}

/// Result of finishing a commit.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// The job is committed. `records` are the delivered forms of the
    /// prepared records, ready to persist.
    Committed {
        status: JobStatus,
        records: Vec<ItemStatus>,
    },
    /// The job was not committing (unknown, or cancelled meanwhile).
    NotCommitting,
}

/// Result of a cancellation.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The job is now cancelled. `rolled_back` are prepared results that
    /// must be reversed by their sinks.
    Cancelled {
        status: JobStatus,
        notice: CancellationNotice,
        rolled_back: Vec<ItemStatus>,
    },
    /// Unknown or already terminal job; nothing changed.
    NoOp,
}

/// Summary of a housekeeping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs whose cancellation notices were forgotten.
    pub notices_dropped: Vec<JobId>,
    /// Orphan records dropped after the grace window.
    pub orphans_dropped: usize,
}

#[derive(Debug)]
struct JobEntry {
    status: JobStatus,
    total_known: bool,
    seen: HashSet<ReferenceId>,
    pages: HashSet<(ReferenceId, i32)>,
    pending_commit: Vec<ItemStatus>,
}

#[derive(Debug)]
struct Orphan {
    status: ItemStatus,
    received_at: DateTime<Utc>,
}

/// Live per-job counters and lifecycle state.
#[derive(Debug)]
pub struct JobStatusAggregator {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<JobEntry>>>>,
    orphans: Mutex<HashMap<JobId, Vec<Orphan>>>,
    cancellations: Arc<CancellationRegistry>,
    orphan_grace: TimeDelta,
    max_orphans_per_job: usize,
}

impl JobStatusAggregator {
    pub fn new(config: &CoordinatorConfig, clock: Arc<dyn Clock>) -> Self {
        let cancellations = Arc::new(CancellationRegistry::new(config.discard_window(), clock));
        Self::with_registry(config, cancellations)
    }

    /// Build an aggregator around an existing notice registry.
    pub fn with_registry(
        config: &CoordinatorConfig,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            orphans: Mutex::new(HashMap::new()),
            cancellations,
            orphan_grace: config.orphan_grace(),
            max_orphans_per_job: config.max_orphans_per_job,
        }
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    fn now(&self) -> DateTime<Utc> {
        self.cancellations.clock().now()
    }

    fn entry(&self, job_id: JobId) -> Option<Arc<Mutex<JobEntry>>> {
        self.jobs.read().get(&job_id).cloned()
    }

    /// Open a job. `total_items` is the size of the accompanying work unit
    /// when known; otherwise the total grows with `Queued` records.
    pub fn start(&self, start: &StartJob, total_items: Option<u64>) -> StartOutcome {
        let job_id = start.job_id();
        let mut status = JobStatus::new(job_id, start.site_id(), self.now());
        status.edition_id = start.edition_id();
        status.pub_server_id = start.pub_server_id();
        status.total_items = total_items.unwrap_or(0);

        let entry = JobEntry {
            status: status.clone(),
            total_known: total_items.is_some(),
            seen: HashSet::new(),
            pages: HashSet::new(),
            pending_commit: Vec::new(),
        };

        let buffered = {
            let mut orphans = self.orphans.lock();
            {
                let mut jobs = self.jobs.write();
                if jobs.contains_key(&job_id) {
                    tracing::warn!("Ignoring duplicate START for job {}", job_id);
                    return StartOutcome::Duplicate;
                }
                jobs.insert(job_id, Arc::new(Mutex::new(entry)));
            }
            orphans.remove(&job_id).unwrap_or_default()
        };

        tracing::info!(
            "Job {} started for site {} ({} items)",
            job_id,
            start.site_id(),
            status.total_items
        );

        let mut replayed = Vec::with_capacity(buffered.len());
        for orphan in buffered {
            let disposition = self.apply_item(&orphan.status);
            replayed.push((orphan.status, disposition));
        }
        if !replayed.is_empty() {
            tracing::info!(
                "Replayed {} early item records for job {}",
                replayed.len(),
                job_id
            );
        }

        let status = self.status(job_id).unwrap_or(status);
        StartOutcome::Started { status, replayed }
    }

    /// Count one item status record.
    pub fn apply_item(&self, item: &ItemStatus) -> ItemDisposition {
        let job_id = item.job_id();

        if self.cancellations.is_cancelled(job_id) {
            if let Some(entry) = self.entry(job_id) {
                entry.lock().status.discarded += 1;
            }
            tracing::debug!(
                "Discarding item {} for cancelled job {}",
                item.reference_id(),
                job_id
            );
            return ItemDisposition::Discarded;
        }

        let entry = match self.entry(job_id) {
            Some(entry) => entry,
            None => {
                let mut orphans = self.orphans.lock();
                // START may have landed between the lookup above and taking
                // the orphan lock.
                match self.entry(job_id) {
                    Some(entry) => {
                        drop(orphans);
                        entry
                    }
                    None => return self.buffer_orphan(&mut orphans, item),
                }
            }
        };

        let mut entry = entry.lock();
        Self::count(&mut entry, item)
    }

    fn buffer_orphan(
        &self,
        orphans: &mut HashMap<JobId, Vec<Orphan>>,
        item: &ItemStatus,
    ) -> ItemDisposition {
        let pending = orphans.entry(item.job_id()).or_default();
        if pending.len() >= self.max_orphans_per_job {
            tracing::warn!(
                "Ignoring item {} for unknown job {}: orphan buffer full",
                item.reference_id(),
                item.job_id()
            );
            return ItemDisposition::Ignored;
        }
        tracing::debug!(
            "Buffering item {} for job {} until START",
            item.reference_id(),
            item.job_id()
        );
        pending.push(Orphan {
            status: item.clone(),
            received_at: self.now(),
        });
        ItemDisposition::Buffered
    }

    fn count(entry: &mut JobEntry, item: &ItemStatus) -> ItemDisposition {
        let job_id = item.job_id();

        if entry.status.state.is_ended() {
            entry.status.stragglers += 1;
            tracing::warn!(
                "Late item {} ({}) for job {} after END; not counted",
                item.reference_id(),
                item.state(),
                job_id
            );
            return ItemDisposition::Straggler;
        }

        if !entry.seen.insert(item.reference_id()) {
            tracing::warn!(
                "Duplicate item {} for job {}; not counted",
                item.reference_id(),
                job_id
            );
            return ItemDisposition::Duplicate;
        }

        if let Some(key) = item.expanded_page_key() {
            if entry.pages.insert(key) {
                entry.status.expanded_pages += 1;
            }
        }

        let status = &mut entry.status;
        match item.state() {
            ItemState::Queued => {
                status.queued_for_assembly += 1;
                if !entry.total_known {
                    status.total_items += 1;
                }
            }
            ItemState::Assembled => status.assembled += 1,
            ItemState::Prepared => {
                status.prepared_for_delivery += 1;
                entry.pending_commit.push(item.clone());
            }
            ItemState::Delivered | ItemState::Unpublished => status.delivered += 1,
            ItemState::Failed => status.failed += 1,
        }

        if !entry.total_known {
            let outcomes = status.finished().saturating_sub(status.expanded_pages);
            status.total_items = status.total_items.max(outcomes);
        }

        let transition = if status.state == JobState::Pending {
            status.state = JobState::Active;
            Some((JobState::Pending, JobState::Active))
        } else {
            None
        };

        ItemDisposition::Counted { transition }
    }

    /// Close a job.
    pub fn end(&self, job_id: JobId) -> EndOutcome {
        let Some(entry) = self.entry(job_id) else {
            tracing::warn!("END for unknown job {}", job_id);
            return EndOutcome::Unknown;
        };
        let now = self.now();
        let mut entry = entry.lock();

        if entry.status.state.is_ended() {
            tracing::warn!(
                "END for job {} which is already {}",
                job_id,
                entry.status.state
            );
            return EndOutcome::AlreadyEnded(entry.status.state);
        }

        Self::stamp_end(&mut entry.status, now);

        if self.cancellations.is_cancelled(job_id) {
            let rolled_back = std::mem::take(&mut entry.pending_commit);
            entry.status.state = JobState::Cancelled;
            entry.status.message = Some("Cancelled before END".into());
            tracing::info!(
                "Job {} ended with a live cancellation; rolling back {} results",
                job_id,
                rolled_back.len()
            );
            return EndOutcome::Cancelled {
                status: entry.status.clone(),
                rolled_back,
            };
        }

        if entry.pending_commit.is_empty() {
            entry.status.state = JobState::Committed;
            Self::finalize_message(&mut entry.status);
            tracing::info!(
                "Job {} committed: {} delivered, {} failed",
                job_id,
                entry.status.delivered,
                entry.status.failed
            );
            return EndOutcome::Committed(entry.status.clone());
        }

        entry.status.state = JobState::Committing;
        tracing::info!(
            "Job {} committing {} prepared results",
            job_id,
            entry.pending_commit.len()
        );
        EndOutcome::Committing {
            status: entry.status.clone(),
            prepared: entry.pending_commit.clone(),
        }
    }

    /// Finish a commit started by [`end`](Self::end).
    ///
    /// On `Err`, the prepared results are counted as failed and the job
    /// still terminates; retries belong to the delivery stage.
    pub fn complete_commit(&self, job_id: JobId, result: Result<(), String>) -> CommitOutcome {
        let Some(entry) = self.entry(job_id) else {
            return CommitOutcome::NotCommitting;
        };
        let mut entry = entry.lock();
        if entry.status.state != JobState::Committing {
            tracing::warn!(
                "Commit finished for job {} which is {}",
                job_id,
                entry.status.state
            );
            return CommitOutcome::NotCommitting;
        }

        let prepared = std::mem::take(&mut entry.pending_commit);
        let count = prepared.len() as u64;
        let records = match result {
            Ok(()) => {
                entry.status.delivered += count;
                prepared.into_iter().map(ItemStatus::into_committed).collect()
            }
            Err(error) => {
                tracing::warn!("Commit failed for job {}: {}", job_id, error);
                entry.status.failed += count;
                entry.status.message = Some(format!("Commit failed: {}", error));
                Vec::new()
            }
        };

        entry.status.state = JobState::Committed;
        Self::finalize_message(&mut entry.status);
        tracing::info!(
            "Job {} committed: {} delivered, {} failed",
            job_id,
            entry.status.delivered,
            entry.status.failed
        );

        CommitOutcome::Committed {
            status: entry.status.clone(),
            records,
        }
    }

    /// Cancel a job. Unknown and terminal jobs are left untouched, and a
    /// second cancellation of the same job is a no-op.
    pub fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let Some(entry) = self.entry(job_id) else {
            tracing::debug!("Cancel for unknown job {} ignored", job_id);
            return CancelOutcome::NoOp;
        };
        let now = self.now();
        let mut entry = entry.lock();

        if entry.status.state.is_terminal() {
            tracing::debug!(
                "Cancel for job {} ignored; already {}",
                job_id,
                entry.status.state
            );
            return CancelOutcome::NoOp;
        }

        let notice = self.cancellations.cancel(job_id);
        let rolled_back = std::mem::take(&mut entry.pending_commit);
        if entry.status.end_time.is_none() {
            Self::stamp_end(&mut entry.status, now);
        }
        entry.status.state = JobState::Cancelled;
        entry.status.message = Some("Cancelled".into());
        tracing::info!(
            "Job {} cancelled; rolling back {} results",
            job_id,
            rolled_back.len()
        );

        CancelOutcome::Cancelled {
            status: entry.status.clone(),
            notice,
            rolled_back,
        }
    }

    /// Current snapshot of a job.
    pub fn status(&self, job_id: JobId) -> Option<JobStatus> {
        let entry = self.entry(job_id)?;
        let mut status = entry.lock().status.clone();
        if status.end_time.is_none() {
            status.elapsed_ms = elapsed_ms(status.start_time, self.now());
        }
        Some(status)
    }

    /// Snapshots of every tracked job.
    pub fn statuses(&self) -> Vec<JobStatus> {
        let ids: Vec<JobId> = self.jobs.read().keys().copied().collect();
        ids.into_iter().filter_map(|id| self.status(id)).collect()
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.jobs.read().contains_key(&job_id)
    }

    /// Orphan records currently buffered for `job_id`.
    pub fn orphan_count(&self, job_id: JobId) -> usize {
        self.orphans.lock().get(&job_id).map_or(0, Vec::len)
    }

    /// Forget expired cancellation notices and orphan records.
    pub fn sweep(&self) -> SweepReport {
        let notices_dropped = self.cancellations.sweep();
        let now = self.now();
        let mut orphans_dropped = 0;

        self.orphans.lock().retain(|job_id, pending| {
            let before = pending.len();
            pending.retain(|orphan| now - orphan.received_at <= self.orphan_grace);
            let dropped = before - pending.len();
            if dropped > 0 {
                tracing::warn!(
                    "Dropping {} item records for job {}: no START within the grace window",
                    dropped,
                    job_id
                );
            }
            orphans_dropped += dropped;
            !pending.is_empty()
        });

        SweepReport {
            notices_dropped,
            orphans_dropped,
        }
    }

    /// Drop terminal aggregates that ended more than `retain` ago.
    pub fn evict_finished(&self, retain: TimeDelta) -> usize {
        let now = self.now();
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let entry = entry.lock();
            !(entry.status.state.is_terminal()
                && entry
                    .status
                    .end_time
                    .is_some_and(|ended| now - ended > retain))
        });
        before - jobs.len()
    }

    fn stamp_end(status: &mut JobStatus, now: DateTime<Utc>) {
        status.end_time = Some(now);
        status.elapsed_ms = elapsed_ms(status.start_time, now);
    }

    fn finalize_message(status: &mut JobStatus) {
        if status.message.is_some() {
            return;
        }
        let missing = status.expected_outcomes().saturating_sub(status.finished());
        if missing > 0 {
            status.message = Some(format!(
                "{} of {} items have no final outcome",
                missing,
                status.expected_outcomes()
            ));
        }
    }
}

fn elapsed_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - start).num_milliseconds().max(0) as u64
}
