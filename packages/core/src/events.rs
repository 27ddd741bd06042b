//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemState, JobId, JobState, ReferenceId, RequestId};

/// Events emitted by the coordination subsystem for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PublishEvent {
    /// A work unit was accepted by the dispatch queue.
    WorkSubmitted {
        request_id: RequestId,
        items: usize,
        timestamp: DateTime<Utc>,
    },
    /// A job was opened by START.
    JobStarted {
        job_id: JobId,
        site_id: i64,
        total_items: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job's lifecycle state changed.
    JobStateChanged {
        job_id: JobId,
        old_state: JobState,
        new_state: JobState,
        timestamp: DateTime<Utc>,
    },
    /// An item record was counted.
    ItemCounted {
        job_id: JobId,
        reference_id: ReferenceId,
        state: ItemState,
        timestamp: DateTime<Utc>,
    },
    /// A job's prepared results were committed.
    JobCommitted {
        job_id: JobId,
        delivered: u64,
        failed: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job was cancelled and its pending results rolled back.
    JobCancelled {
        job_id: JobId,
        rolled_back: usize,
        timestamp: DateTime<Utc>,
    },
    /// A worker attached to the dispatch queue.
    WorkerConnected {
        worker_id: String,
        stage: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker detached from the dispatch queue.
    WorkerDisconnected {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl PublishEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PublishEvent::WorkSubmitted { timestamp, .. } => *timestamp,
            PublishEvent::JobStarted { timestamp, .. } => *timestamp,
            PublishEvent::JobStateChanged { timestamp, .. } => *timestamp,
            PublishEvent::ItemCounted { timestamp, .. } => *timestamp,
            PublishEvent::JobCommitted { timestamp, .. } => *timestamp,
            PublishEvent::JobCancelled { timestamp, .. } => *timestamp,
            PublishEvent::WorkerConnected { timestamp, .. } => *timestamp,
            PublishEvent::WorkerDisconnected { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            PublishEvent::JobStarted { job_id, .. } => Some(*job_id),
            PublishEvent::JobStateChanged { job_id, .. } => Some(*job_id),
            PublishEvent::ItemCounted { job_id, .. } => Some(*job_id),
            PublishEvent::JobCommitted { job_id, .. } => Some(*job_id),
            PublishEvent::JobCancelled { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            PublishEvent::WorkSubmitted {
                request_id, items, ..
            } => format!("Work unit {} submitted with {} items", request_id, items),
            PublishEvent::JobStarted {
                job_id,
                site_id,
                total_items,
                ..
            } => format!(
                "Job {} started for site {} ({} items)",
                job_id, site_id, total_items
            ),
            PublishEvent::JobStateChanged {
                job_id, new_state, ..
            } => format!("Job {} -> {}", job_id, new_state),
            PublishEvent::ItemCounted {
                job_id,
                reference_id,
                state,
                ..
            } => format!("Job {} item {} {}", job_id, reference_id, state),
            PublishEvent::JobCommitted {
                job_id,
                delivered,
                failed,
                ..
            } => format!(
                "Job {} committed: {} delivered, {} failed",
                job_id, delivered, failed
            ),
            PublishEvent::JobCancelled {
                job_id,
                rolled_back,
                ..
            } => format!("Job {} cancelled, {} results rolled back", job_id, rolled_back),
            PublishEvent::WorkerConnected {
                worker_id, stage, ..
            } => format!("Worker {} connected ({})", worker_id, stage),
            PublishEvent::WorkerDisconnected { worker_id, .. } => {
                format!("Worker {} disconnected", worker_id)
            }
        }
    }
}
