//! Shared fakes and helpers for actor tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{
    Actor, ActorRef, AssembledItem, Assembler, AssemblyTask, DeliveredItem, DeliveryHandler,
    DeliveryTask, DispatchQueue, DispatchQueueArgs, HandlerFuture, QueueMessage, RpcReplyPort,
    StageHandlers, SupervisorArgs, SupervisorMessage, start_supervisor,
};
use db::MemoryLogStore;
use parking_lot::Mutex;
use publish_core::{
    CoordinatorConfig, JobId, JobStatus, JobStatusAggregator, PublishMessage, StartJob,
    SystemClock, WorkUnit,
};
use ractor::rpc::CallResult;
use tokio::sync::{Semaphore, broadcast};

pub const SITE: i64 = 3;
pub const DELIVERY: &str = "filesystem";

const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// Assembler that renders `pages[content_id]` pages (one by default) and
/// fails the content ids it is told to.
#[derive(Default)]
pub struct TestAssembler {
    pub pages: HashMap<i64, usize>,
    pub failing: HashSet<i64>,
    /// When set, each assembly waits for a permit.
    pub gate: Option<Arc<Semaphore>>,
    pub calls: Arc<AtomicUsize>,
}

impl TestAssembler {
    pub fn with_pages(mut self, content_id: i64, pages: usize) -> Self {
        self.pages.insert(content_id, pages);
        self
    }

    pub fn failing(mut self, content_id: i64) -> Self {
        self.failing.insert(content_id);
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl Assembler for TestAssembler {
    fn assemble(&self, task: &AssemblyTask) -> HandlerFuture<AssembledItem> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content_id = task.item.content_id();
        let fail = self.failing.contains(&content_id);
        let pages = self.pages.get(&content_id).copied().unwrap_or(1);
        let gate = self.gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                match gate.acquire().await {
                    Ok(permit) => permit.forget(),
                    Err(e) => return Err(e.to_string()),
                }
            }
            if fail {
                return Err(format!("template error in content {}", content_id));
            }
            let mut assembled = AssembledItem::single(format!("<html>{}</html>", content_id))
                .with_template(42)
                .with_assembly_url(format!("http://assembly/{}", content_id));
            for page in 2..=pages {
                assembled = assembled.with_page(format!("<html>{} p{}</html>", content_id, page));
            }
            Ok(assembled)
        })
    }
}

/// Delivery sink that records what it is asked to do.
#[derive(Clone)]
pub struct RecordingDelivery {
    pub delivery_type: String,
    pub transactional: bool,
    pub delivered: Arc<Mutex<Vec<(JobId, i64, i32)>>>,
    pub commits: Arc<AtomicUsize>,
    pub rollbacks: Arc<AtomicUsize>,
    /// How long each commit takes.
    pub commit_delay: Duration,
}

impl RecordingDelivery {
    pub fn new(delivery_type: &str) -> Self {
        Self {
            delivery_type: delivery_type.to_string(),
            transactional: false,
            delivered: Arc::new(Mutex::new(Vec::new())),
            commits: Arc::new(AtomicUsize::new(0)),
            rollbacks: Arc::new(AtomicUsize::new(0)),
            commit_delay: Duration::ZERO,
        }
    }

    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    pub fn slow_commit(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().len()
    }
}

impl DeliveryHandler for RecordingDelivery {
    fn delivery_type(&self) -> &str {
        &self.delivery_type
    }

    fn deliver(&self, task: &DeliveryTask) -> HandlerFuture<DeliveredItem> {
        self.delivered
            .lock()
            .push((task.job_id(), task.item.content_id(), task.page));
        let location = format!(
            "/site/{}/{}-{}.html",
            task.job.site_id(), task.item.content_id(), task.page
        );
        Box::pin(async move { Ok(DeliveredItem::at(location)) })
    }

    fn is_transactional(&self) -> bool {
        self.transactional
    }

    fn commit(&self, _job_id: JobId) -> HandlerFuture<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let delay = self.commit_delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(())
        })
    }

    fn rollback(&self, _job_id: JobId) -> HandlerFuture<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_workers(2, 2)
        .with_poll_interval_ms(5)
}

/// Start a supervisor over an in-memory log store.
pub async fn start_pipeline(
    handlers: StageHandlers,
) -> Result<(ActorRef<SupervisorMessage>, Arc<MemoryLogStore>), Box<dyn Error>> {
    let store = Arc::new(MemoryLogStore::new());
    let args = SupervisorArgs::new(handlers, store.clone()).with_config(fast_config());
    let (supervisor, _handle) = start_supervisor(args).await?;
    Ok((supervisor, store))
}

/// A dispatch queue with no workers attached.
pub async fn spawn_queue(
    capacity: usize,
) -> Result<
    (
        ActorRef<QueueMessage>,
        Arc<JobStatusAggregator>,
        Arc<MemoryLogStore>,
    ),
    Box<dyn Error>,
> {
    let aggregator = Arc::new(JobStatusAggregator::new(
        &CoordinatorConfig::default(),
        Arc::new(SystemClock),
    ));
    let store = Arc::new(MemoryLogStore::new());
    let (event_tx, _) = broadcast::channel(64);
    let args = DispatchQueueArgs {
        aggregator: aggregator.clone(),
        store: store.clone(),
        handlers: Arc::new(StageHandlers::new()),
        event_tx,
        capacity,
    };
    let (queue, _handle) = Actor::spawn(None, DispatchQueue, args).await?;
    Ok((queue, aggregator, store))
}

pub fn start(job_id: i64) -> StartJob {
    StartJob::new(job_id, SITE).with_delivery_type(DELIVERY)
}

pub fn unit(count: i64) -> WorkUnit {
    WorkUnit::from_pairs((1..=count).map(|content_id| (10, content_id)))
}

/// Ask an actor something and wait for the answer.
pub async fn ask<M, T, F>(actor: &ActorRef<M>, build: F) -> Result<T, Box<dyn Error>>
where
    M: ractor::Message,
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> M,
{
    match ractor::rpc::call(actor, build, Some(CALL_TIMEOUT))
        .await
        .map_err(|e| e.to_string())?
    {
        CallResult::Success(value) => Ok(value),
        CallResult::Timeout => Err("call timed out".into()),
        CallResult::SenderError => Err("actor dropped the reply port".into()),
    }
}

pub async fn submit(
    queue: &ActorRef<QueueMessage>,
    message: PublishMessage,
) -> Result<Result<(), String>, Box<dyn Error>> {
    ask(queue, |reply| QueueMessage::Submit { message, reply }).await
}

pub async fn job_status(
    supervisor: &ActorRef<SupervisorMessage>,
    job_id: i64,
) -> Result<Option<JobStatus>, Box<dyn Error>> {
    let status = ask(supervisor, |reply| SupervisorMessage::GetJobStatus {
        job_id: JobId(job_id),
        reply,
    })
    .await??;
    Ok(status)
}

/// Poll a job's status until `done` holds.
pub async fn wait_for<F>(
    supervisor: &ActorRef<SupervisorMessage>,
    job_id: i64,
    done: F,
) -> Result<JobStatus, Box<dyn Error>>
where
    F: Fn(&JobStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    loop {
        let status = job_status(supervisor, job_id).await?;
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

/// Poll until `condition` holds.
pub async fn eventually<F>(condition: F) -> Result<(), Box<dyn Error>>
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            return Err("condition never held".into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
