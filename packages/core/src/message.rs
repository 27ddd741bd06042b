//! The message kinds exchanged over the dispatch queue.

use serde::{Deserialize, Serialize};

use crate::{CancellationNotice, ItemStatus, JobControlMessage, JobId, Priority, WorkUnit};

/// Every message that travels through the dispatch queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum PublishMessage {
    Work(WorkUnit),
    Control(JobControlMessage),
    Cancel(CancellationNotice),
    Item(Box<ItemStatus>),
}

impl PublishMessage {
    /// Dispatch priority. Control and cancellation preempt item traffic.
    pub fn priority(&self) -> Priority {
        match self {
            PublishMessage::Control(_) | PublishMessage::Cancel(_) => Priority::Critical,
            PublishMessage::Item(_) => Priority::High,
            PublishMessage::Work(_) => Priority::Normal,
        }
    }

    /// The job this message concerns, if it is bound to one.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            PublishMessage::Work(_) => None,
            PublishMessage::Control(control) => Some(control.job_id()),
            PublishMessage::Cancel(notice) => Some(notice.job_id),
            PublishMessage::Item(status) => Some(status.job_id()),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishMessage::Work(_) => "work",
            PublishMessage::Control(_) => "control",
            PublishMessage::Cancel(_) => "cancel",
            PublishMessage::Item(_) => "item",
        }
    }
}

impl From<WorkUnit> for PublishMessage {
    fn from(unit: WorkUnit) -> Self {
        PublishMessage::Work(unit)
    }
}

impl From<JobControlMessage> for PublishMessage {
    fn from(control: JobControlMessage) -> Self {
        PublishMessage::Control(control)
    }
}

impl From<CancellationNotice> for PublishMessage {
    fn from(notice: CancellationNotice) -> Self {
        PublishMessage::Cancel(notice)
    }
}

impl From<ItemStatus> for PublishMessage {
    fn from(status: ItemStatus) -> Self {
        PublishMessage::Item(Box::new(status))
    }
}
