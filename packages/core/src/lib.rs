//! Core domain types for publishing job coordination.
//!
//! This crate contains the types shared by every package:
//! - Work units, control messages and cancellation notices
//! - Item and job status records
//! - The job status aggregator and its cancellation registry
//! - Events for real-time updates

mod aggregator;
mod cancel;
mod config;
mod control;
mod events;
mod ids;
mod item;
mod job;
mod message;
mod sort;
mod work;

pub use aggregator::{
    CancelOutcome, CommitOutcome, EndOutcome, ItemDisposition, JobStatusAggregator, StartOutcome,
    SweepReport,
};
pub use cancel::{
    CancellationNotice, CancellationRegistry, Clock, DISCARD_WINDOW_SECS, ManualClock,
    SystemClock, discard_window,
};
pub use config::CoordinatorConfig;
pub use control::{ControlKind, DEFAULT_DELIVERY_TYPE, JobControlMessage, StartJob};
pub use events::PublishEvent;
pub use ids::{IdAllocator, JobId, ReferenceId, RequestId};
pub use item::{ItemState, ItemStatus, ItemStatusBuilder, ValidationError};
pub use job::{JobState, JobStatus, Priority};
pub use message::PublishMessage;
pub use sort::{SortDirection, SortField, SortSpec};
pub use work::{FolderContent, WorkUnit};
