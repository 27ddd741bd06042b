#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use actors::{FnAssembler, FnDelivery, HandlerFuture};
use api::{
    AssembledItem, AssemblyTask, CoordinatorConfig, DeliveredItem, DeliveryTask, JobId,
    JobStatus, StageHandlers,
};
use db::MemoryLogStore;
use publish_core::DEFAULT_DELIVERY_TYPE;
use tokio::sync::{Mutex, MutexGuard};

/// The API talks to one global supervisor, so tests take turns.
static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub const SITE: i64 = 5;

fn handlers() -> StageHandlers {
    StageHandlers::new()
        .with_assembler(FnAssembler::new(|task: &AssemblyTask| -> HandlerFuture<AssembledItem> {
            let content_id = task.item.content_id();
            Box::pin(async move {
                Ok(AssembledItem::single(format!("<p>{}</p>", content_id)).with_template(1))
            })
        }))
        .with_delivery(FnDelivery::new(DEFAULT_DELIVERY_TYPE, |task: &DeliveryTask| -> HandlerFuture<DeliveredItem> {
            let location = format!("/www/{}.html", task.item.content_id());
            Box::pin(async move { Ok(DeliveredItem::at(location)) })
        }))
}

/// Start a fresh coordinator over an in-memory log.
pub async fn setup() -> Result<MutexGuard<'static, ()>, Box<dyn Error>> {
    setup_with(|config| config).await
}

/// Like [`setup`], with extra configuration applied on top.
pub async fn setup_with<F>(configure: F) -> Result<MutexGuard<'static, ()>, Box<dyn Error>>
where
    F: FnOnce(CoordinatorConfig) -> CoordinatorConfig,
{
    let guard = TEST_LOCK.lock().await;
    let config = CoordinatorConfig::default()
        .with_workers(2, 2)
        .with_poll_interval_ms(5)
        .with_max_page_size(20);
    api::start_publishing(configure(config), handlers(), Arc::new(MemoryLogStore::new())).await?;
    Ok(guard)
}

/// Poll a job's status until `done` holds.
pub async fn wait_for<F>(job_id: i64, done: F) -> Result<JobStatus, Box<dyn Error>>
where
    F: Fn(&JobStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = api::get_job_status(JobId(job_id)).await?;
        if let Some(status) = &status
            && done(status)
        {
            return Ok(status.clone());
        }
        if tokio::time::Instant::now() > deadline {
            return Err(format!("job {} never reached the expected state: {:?}", job_id, status).into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
