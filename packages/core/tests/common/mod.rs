use std::sync::Arc;

use publish_core::{
    CoordinatorConfig, ItemState, ItemStatus, JobId, JobStatusAggregator, ManualClock,
    ReferenceId, StartJob,
};

pub const SITE: i64 = 7;

pub fn aggregator() -> (JobStatusAggregator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let aggregator = JobStatusAggregator::new(&CoordinatorConfig::default(), clock.clone());
    (aggregator, clock)
}

pub fn start(job_id: i64) -> StartJob {
    StartJob::new(job_id, SITE)
}

pub fn item(job_id: i64, item_id: i64, state: ItemState) -> ItemStatus {
    ItemStatus::builder(JobId(job_id), state)
        .item(item_id)
        .site(SITE)
        .delivery_type("filesystem")
        .build()
        .expect("valid item status")
}

pub fn page(job_id: i64, parent: ReferenceId, page: i32, state: ItemState) -> ItemStatus {
    ItemStatus::builder(JobId(job_id), state)
        .item(1)
        .site(SITE)
        .delivery_type("filesystem")
        .page(page)
        .parent_page(parent)
        .build()
        .expect("valid page status")
}
