//! In-process API for publishing job coordination.
//!
//! This crate is the facade callers use:
//! - Work submission and job control (start, end, cancel)
//! - Job and item status queries
//! - Paged publishing log access
//! - Real-time events

mod error;
mod init;
mod jobs;
mod logs;
mod realtime;
mod work;

pub use error::{ApiError, ApiResult};
pub use init::{init_publishing, init_tracing, shutdown_publishing, start_publishing};
pub use jobs::*;
pub use logs::{
    CursorId, close_cursor, cursor_count, evict_idle_cursors, open_cursor, page, refresh_cursor,
    set_cursor_sort,
};
pub use realtime::{format_sse_event, subscribe};
pub use work::{submit_unit, submit_work};

// Re-export core types for convenience
pub use actors::{
    AssembledItem, Assembler, AssemblyTask, DeliveredItem, DeliveryHandler, DeliveryTask,
    QueueStats, StageHandlers,
};
pub use db::PageEntry;
pub use publish_core::{
    CoordinatorConfig, FolderContent, ItemState, ItemStatus, JobId, JobState, JobStatus,
    PublishEvent, ReferenceId, RequestId, SortField, SortSpec, StartJob, WorkUnit,
};
