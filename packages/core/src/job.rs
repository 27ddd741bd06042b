//! Job-level aggregate status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Priority level used by the dispatch queue.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal = 0,
    High = 1,
    Critical = 2,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Lifecycle of a job as seen by the aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum JobState {
    /// START received, no item records yet.
    #[default]
    Pending,
    /// At least one item record has been counted.
    Active,
    /// END received; prepared delivery results are being committed.
    Committing,
    /// Terminated normally.
    Committed,
    /// Terminated by cancellation; queued results were rolled back.
    Cancelled,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Committed | JobState::Cancelled)
    }

    /// Whether END has been seen (terminal or committing).
    pub fn is_ended(&self) -> bool {
        matches!(
            self,
            JobState::Committing | JobState::Committed | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Committing => "committing",
            JobState::Committed => "committed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job's live counters and lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition_id: Option<i64>,
    pub site_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_server_id: Option<i64>,
    pub total_items: u64,
    pub queued_for_assembly: u64,
    pub assembled: u64,
    pub prepared_for_delivery: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Pages created by assembly on top of `total_items`.
    #[serde(default)]
    pub expanded_pages: u64,
    /// Records that arrived after END and were not counted.
    #[serde(default)]
    pub stragglers: u64,
    /// Records dropped because the job was cancelled.
    #[serde(default)]
    pub discarded: u64,
    pub state: JobState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between START and END (or the snapshot, while running).
    pub elapsed_ms: u64,
    #[serde(default)]
    pub rerun_after: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobStatus {
    /// A fresh aggregate in the pending state.
    pub fn new(job_id: JobId, site_id: i64, start_time: DateTime<Utc>) -> Self {
        Self {
            job_id,
            edition_id: None,
            site_id,
            pub_server_id: None,
            total_items: 0,
            queued_for_assembly: 0,
            assembled: 0,
            prepared_for_delivery: 0,
            delivered: 0,
            failed: 0,
            expanded_pages: 0,
            stragglers: 0,
            discarded: 0,
            state: JobState::Pending,
            start_time,
            end_time: None,
            elapsed_ms: 0,
            rerun_after: false,
            message: None,
        }
    }

    /// Items the job must account for, including expanded pages.
    pub fn expected_outcomes(&self) -> u64 {
        self.total_items + self.expanded_pages
    }

    /// Items that reached a final outcome.
    pub fn finished(&self) -> u64 {
        self.delivered + self.failed
    }

    /// True when every expected item has a final outcome.
    pub fn is_balanced(&self) -> bool {
        self.finished() == self.expected_outcomes()
    }
}
