//! Coordinator configuration.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::cancel::DISCARD_WINDOW_SECS;

/// Tunables for the coordination subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long a cancellation notice is honoured (seconds).
    pub discard_window_secs: i64,
    /// How long item records that precede their job's START are held (seconds).
    pub orphan_grace_secs: i64,
    /// Upper bound on buffered orphan records per job.
    pub max_orphans_per_job: usize,
    /// Largest page a log cursor will serve.
    pub max_page_size: usize,
    /// Messages the dispatch queue holds before pushing back on producers.
    pub queue_capacity: usize,
    /// Number of assembly worker actors.
    pub assembly_workers: u32,
    /// Number of delivery worker actors.
    pub delivery_workers: u32,
    /// Worker poll interval (milliseconds).
    pub poll_interval_ms: u64,
    /// Longest a stage handler may spend on one task (seconds).
    pub task_timeout_secs: u64,
    /// Housekeeping tick interval (seconds).
    pub sweep_interval_secs: u64,
    /// Log cursors untouched this long are closed (seconds).
    pub cursor_idle_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            discard_window_secs: DISCARD_WINDOW_SECS,
            orphan_grace_secs: 30,
            max_orphans_per_job: 1024,
            max_page_size: 100,
            queue_capacity: 10_000,
            assembly_workers: 4,
            delivery_workers: 4,
            poll_interval_ms: 100,
            task_timeout_secs: 300,
            sweep_interval_secs: 60,
            cursor_idle_secs: 900,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults overridden by any `PUBLISH_*` environment variables present.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        override_from_env("PUBLISH_DISCARD_WINDOW_SECS", &mut config.discard_window_secs);
        override_from_env("PUBLISH_ORPHAN_GRACE_SECS", &mut config.orphan_grace_secs);
        override_from_env("PUBLISH_MAX_ORPHANS_PER_JOB", &mut config.max_orphans_per_job);
        override_from_env("PUBLISH_MAX_PAGE_SIZE", &mut config.max_page_size);
        override_from_env("PUBLISH_QUEUE_CAPACITY", &mut config.queue_capacity);
        override_from_env("PUBLISH_ASSEMBLY_WORKERS", &mut config.assembly_workers);
        override_from_env("PUBLISH_DELIVERY_WORKERS", &mut config.delivery_workers);
        override_from_env("PUBLISH_POLL_INTERVAL_MS", &mut config.poll_interval_ms);
        override_from_env("PUBLISH_TASK_TIMEOUT_SECS", &mut config.task_timeout_secs);
        override_from_env("PUBLISH_SWEEP_INTERVAL_SECS", &mut config.sweep_interval_secs);
        override_from_env("PUBLISH_CURSOR_IDLE_SECS", &mut config.cursor_idle_secs);
        config
    }

    pub fn discard_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.discard_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn cursor_idle(&self) -> Duration {
        Duration::from_secs(self.cursor_idle_secs)
    }

    pub fn orphan_grace(&self) -> TimeDelta {
        TimeDelta::seconds(self.orphan_grace_secs)
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn with_workers(mut self, assembly: u32, delivery: u32) -> Self {
        self.assembly_workers = assembly;
        self.delivery_workers = delivery;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_sweep_interval_secs(mut self, sweep_interval_secs: u64) -> Self {
        self.sweep_interval_secs = sweep_interval_secs;
        self
    }

    pub fn with_cursor_idle_secs(mut self, cursor_idle_secs: u64) -> Self {
        self.cursor_idle_secs = cursor_idle_secs;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring unparseable {}={:?}", key, raw),
        }
    }
}
