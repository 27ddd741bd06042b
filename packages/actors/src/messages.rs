//! Message types for actor communication.

use publish_core::{
    ItemStatus, JobId, JobStatus, PublishEvent, PublishMessage, ReferenceId, SortSpec, StartJob,
    WorkUnit,
};
use ractor::RpcReplyPort;
use serde::{Deserialize, Serialize};

use crate::tasks::{DeliveryTask, Stage, StageTask};

/// Messages for the DispatchQueue actor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Accept a message from a producer. Refused while the queue is full.
    Submit {
        message: PublishMessage,
        reply: RpcReplyPort<Result<(), String>>,
    },

    /// An item status produced by a worker. Never refused.
    Report { status: Box<ItemStatus> },

    /// A delivery task produced by an assembly worker.
    Deliver { task: Box<DeliveryTask> },

    /// Request the next task for a worker.
    RequestTask {
        worker_id: String,
        stage: Stage,
        reply: RpcReplyPort<Option<StageTask>>,
    },

    /// Dispatch buffered messages in priority order.
    Drain,

    /// Transactional sinks finished committing a job.
    CommitFinished {
        job_id: JobId,
        result: Result<(), String>,
    },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Shutdown the queue gracefully.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one task.
    ProcessTask { task: Box<StageTask> },

    /// Shutdown the worker.
    Shutdown,

    /// Heartbeat tick.
    Heartbeat,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Submit a work unit.
    SubmitWork {
        unit: WorkUnit,
        reply: RpcReplyPort<Result<(), String>>,
    },

    /// Open a job.
    StartJob {
        start: Box<StartJob>,
        reply: RpcReplyPort<Result<(), String>>,
    },

    /// Close a job.
    EndJob {
        job_id: JobId,
        reply: RpcReplyPort<Result<(), String>>,
    },

    /// Cancel a job.
    CancelJob {
        job_id: JobId,
        reply: RpcReplyPort<Result<(), String>>,
    },

    /// Feed an item status from an external stage.
    ReportItem {
        status: Box<ItemStatus>,
        reply: RpcReplyPort<Result<(), String>>,
    },

    /// Get a job's status, live or persisted.
    GetJobStatus {
        job_id: JobId,
        reply: RpcReplyPort<Result<Option<JobStatus>, String>>,
    },

    /// Get persisted item status records.
    GetItemStatus {
        reference_ids: Vec<ReferenceId>,
        reply: RpcReplyPort<Result<Vec<ItemStatus>, String>>,
    },

    /// Get a job's reference ids in sort order.
    FindReferenceIds {
        job_id: JobId,
        sort: SortSpec,
        reply: RpcReplyPort<Result<Vec<ReferenceId>, String>>,
    },

    /// Get dispatch queue stats.
    GetQueueStats {
        reply: RpcReplyPort<Result<QueueStats, String>>,
    },

    /// Subscribe to events.
    Subscribe {
        sender: tokio::sync::broadcast::Sender<PublishEvent>,
    },

    /// Shutdown the queue and workers.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,
}

/// Snapshot of the dispatch queue's buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Messages waiting to be dispatched.
    pub pending_messages: usize,
    /// Items waiting for an assembly worker.
    pub assembly_tasks: usize,
    /// Pages waiting for a delivery worker.
    pub delivery_tasks: usize,
    /// Work units not yet claimed by a START.
    pub unclaimed_work: usize,
    /// Jobs with an open context.
    pub open_jobs: usize,
    pub capacity: usize,
}

/// Result type for internal operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Error type for coordination operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Supervisor not available")]
    SupervisorUnavailable,

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Timeout")]
    Timeout,
}

impl CoordinationError {
    /// Reply text used over `RpcReplyPort`s.
    pub(crate) fn reply(self) -> String {
        self.to_string()
    }

    /// Whether the failure is a transient full-queue refusal.
    pub fn is_queue_full(message: &str) -> bool {
        message == CoordinationError::QueueFull.to_string()
    }
}
