//! Dispatch queue actor.
//!
//! Every producer message goes through this actor. Messages are buffered in
//! a heap ordered by priority and arrival, then dispatched by a single
//! `match` in [`DispatchQueueState::dispatch`]. Stage work derived from
//! those messages sits in per-stage FIFO queues that workers poll.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::PublishLogStore;
use futures_util::future::join_all;
use publish_core::{
    CancelOutcome, CancellationNotice, CommitOutcome, EndOutcome, ItemDisposition, ItemState,
    ItemStatus, JobControlMessage, JobId, JobState, JobStatus, JobStatusAggregator, Priority,
    PublishEvent, PublishMessage, RequestId, StartJob, StartOutcome, WorkUnit,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::handler::StageHandlers;
use crate::messages::{CoordinationError, QueueMessage, QueueStats};
use crate::tasks::{AssemblyTask, DeliveryTask, Stage, StageTask, item_status};

/// Messages dispatched per `Drain` before yielding to other mailbox traffic.
const DRAIN_BATCH: usize = 64;

/// Heap entry: higher priority first, then earlier arrival.
#[derive(Debug)]
struct QueuedMessage {
    priority: Priority,
    seq: u64,
    message: PublishMessage,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// Arguments for the dispatch queue actor.
pub struct DispatchQueueArgs {
    pub aggregator: Arc<JobStatusAggregator>,
    pub store: Arc<dyn PublishLogStore>,
    pub handlers: Arc<StageHandlers>,
    pub event_tx: broadcast::Sender<PublishEvent>,
    pub capacity: usize,
}

/// State for the dispatch queue actor.
pub struct DispatchQueueState {
    pending: BinaryHeap<QueuedMessage>,
    next_seq: u64,
    drain_scheduled: bool,
    assembly: VecDeque<AssemblyTask>,
    delivery: VecDeque<DeliveryTask>,
    /// Work units waiting for a START to claim them.
    work_units: HashMap<RequestId, (WorkUnit, DateTime<Utc>)>,
    /// Work units named by a START before they arrived.
    claims: HashMap<RequestId, JobId>,
    /// Open jobs, shared with the tasks derived from them.
    jobs: HashMap<JobId, Arc<StartJob>>,
    capacity: usize,
    aggregator: Arc<JobStatusAggregator>,
    store: Arc<dyn PublishLogStore>,
    handlers: Arc<StageHandlers>,
    event_tx: broadcast::Sender<PublishEvent>,
}

impl DispatchQueueState {
    pub fn new(args: DispatchQueueArgs) -> Self {
        Self {
            pending: BinaryHeap::new(),
            next_seq: 0,
            drain_scheduled: false,
            assembly: VecDeque::new(),
            delivery: VecDeque::new(),
            work_units: HashMap::new(),
            claims: HashMap::new(),
            jobs: HashMap::new(),
            capacity: args.capacity.max(1),
            aggregator: args.aggregator,
            store: args.store,
            handlers: args.handlers,
            event_tx: args.event_tx,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.aggregator.cancellations().clock().now()
    }

    /// Broadcast an event.
    fn broadcast(&self, event: PublishEvent) {
        let _ = self.event_tx.send(event);
    }

    fn push(&mut self, message: PublishMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(QueuedMessage {
            priority: message.priority(),
            seq,
            message,
        });
    }

    fn schedule_drain(&mut self, myself: &ActorRef<QueueMessage>) {
        if !self.drain_scheduled {
            self.drain_scheduled = myself.send_message(QueueMessage::Drain).is_ok();
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            pending_messages: self.pending.len(),
            assembly_tasks: self.assembly.len(),
            delivery_tasks: self.delivery.len(),
            unclaimed_work: self.work_units.len(),
            open_jobs: self.jobs.len(),
            capacity: self.capacity,
        }
    }

    /// Next task for `stage`, skipping tasks of cancelled jobs.
    fn next_task(&mut self, stage: Stage) -> Option<StageTask> {
        let cancellations = self.aggregator.cancellations().clone();
        loop {
            let task = match stage {
                Stage::Assembly => self.assembly.pop_front().map(StageTask::Assembly),
                Stage::Delivery => self.delivery.pop_front().map(StageTask::Delivery),
            }?;
            if cancellations.is_cancelled(task.job_id()) {
                tracing::debug!(
                    "Dropping {} task for cancelled job {}",
                    stage,
                    task.job_id()
                );
                continue;
            }
            return Some(task);
        }
    }

    fn purge_tasks(&mut self, job_id: JobId) -> usize {
        let before = self.assembly.len() + self.delivery.len();
        self.assembly.retain(|task| task.job_id() != job_id);
        self.delivery.retain(|task| task.job_id() != job_id);
        before - self.assembly.len() - self.delivery.len()
    }

    async fn dispatch(&mut self, myself: &ActorRef<QueueMessage>, message: PublishMessage) {
        tracing::debug!(
            "Dispatching {} message (job {:?})",
            message.kind(),
            message.job_id()
        );
        match message {
            PublishMessage::Work(unit) => self.on_work(unit).await,
            PublishMessage::Control(JobControlMessage::Start(start)) => self.on_start(start).await,
            PublishMessage::Control(JobControlMessage::End { job_id, .. }) => {
                self.on_end(myself, job_id).await
            }
            PublishMessage::Cancel(notice) => self.on_cancel(notice).await,
            PublishMessage::Item(status) => {
                let disposition = self.aggregator.apply_item(&status);
                self.after_item(*status, disposition).await;
            }
        }
    }

    async fn on_work(&mut self, unit: WorkUnit) {
        let request_id = unit.request_id();
        self.broadcast(PublishEvent::WorkSubmitted {
            request_id,
            items: unit.len(),
            timestamp: Utc::now(),
        });

        if let Some(job_id) = self.claims.remove(&request_id) {
            match self.jobs.get(&job_id).cloned() {
                Some(job) => self.enqueue_unit(job, unit).await,
                None => tracing::warn!(
                    "Dropping work unit {}: job {} is no longer open",
                    request_id,
                    job_id
                ),
            }
            return;
        }

        let now = self.now();
        self.work_units.insert(request_id, (unit, now));
    }

    async fn on_start(&mut self, start: StartJob) {
        let job_id = start.job_id();
        let unit = match start.work_request_id() {
            Some(request_id) => match self.work_units.remove(&request_id) {
                Some((unit, _)) => Some(unit),
                None => {
                    tracing::debug!(
                        "Job {} waits for work unit {} to arrive",
                        job_id,
                        request_id
                    );
                    None
                }
            },
            None => None,
        };
        let total = unit.as_ref().map(|unit| unit.len() as u64);

        match self.aggregator.start(&start, total) {
            StartOutcome::Duplicate => {
                if let Some(unit) = unit {
                    let now = self.now();
                    self.work_units.insert(unit.request_id(), (unit, now));
                }
            }
            StartOutcome::Started { status, replayed } => {
                self.broadcast(PublishEvent::JobStarted {
                    job_id,
                    site_id: status.site_id,
                    total_items: status.total_items,
                    timestamp: Utc::now(),
                });
                for (record, disposition) in replayed {
                    self.after_item(record, disposition).await;
                }

                let job = Arc::new(start);
                self.jobs.insert(job_id, job.clone());
                match unit {
                    Some(unit) => self.enqueue_unit(job, unit).await,
                    None => {
                        if let Some(request_id) = job.work_request_id() {
                            self.claims.insert(request_id, job_id);
                        }
                    }
                }
            }
        }
    }

    /// Record a `Queued` status and an assembly task for every item.
    async fn enqueue_unit(&mut self, job: Arc<StartJob>, unit: WorkUnit) {
        let request_id = unit.request_id();
        let mut queued = 0;
        for item in unit.into_items() {
            let status = match item_status(&job, item, ItemState::Queued).build() {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        "Cannot queue content {} of job {}: {}",
                        item.content_id(),
                        job.job_id(),
                        e
                    );
                    continue;
                }
            };
            let disposition = self.aggregator.apply_item(&status);
            self.after_item(status, disposition).await;
            self.assembly.push_back(AssemblyTask {
                job: job.clone(),
                item,
            });
            queued += 1;
        }
        tracing::info!(
            "Queued {} items of work unit {} for job {}",
            queued,
            request_id,
            job.job_id()
        );
    }

    /// Persist and announce a record the aggregator has seen.
    async fn after_item(&mut self, record: ItemStatus, disposition: ItemDisposition) {
        let ItemDisposition::Counted { transition } = disposition else {
            return;
        };
        let job_id = record.job_id();

        self.broadcast(PublishEvent::ItemCounted {
            job_id,
            reference_id: record.reference_id(),
            state: record.state(),
            timestamp: Utc::now(),
        });
        if let Some((old_state, new_state)) = transition {
            self.broadcast(PublishEvent::JobStateChanged {
                job_id,
                old_state,
                new_state,
                timestamp: Utc::now(),
            });
        }

        if record.state().is_terminal() {
            let reference_id = record.reference_id();
            if let Err(e) = self.store.save_item(record).await {
                tracing::warn!("Failed to persist item status {}: {}", reference_id, e);
            }
        }
    }

    async fn on_end(&mut self, myself: &ActorRef<QueueMessage>, job_id: JobId) {
        let before = self.aggregator.status(job_id).map(|status| status.state);

        match self.aggregator.end(job_id) {
            EndOutcome::Committed(status) => {
                self.announce_state(job_id, before, status.state);
                self.finish_job(status).await;
            }
            EndOutcome::Committing { status, prepared } => {
                self.announce_state(job_id, before, status.state);
                self.start_commit(myself, job_id, &prepared);
            }
            EndOutcome::Cancelled {
                status,
                rolled_back,
            } => {
                self.announce_state(job_id, before, status.state);
                self.start_rollback(job_id, &rolled_back);
                self.finish_cancelled(status, rolled_back.len()).await;
            }
            EndOutcome::AlreadyEnded(_) | EndOutcome::Unknown => {}
        }
    }

    /// Settle a job whose sink commit has returned.
    async fn on_commit_finished(&mut self, job_id: JobId, result: Result<(), String>) {
        match self.aggregator.complete_commit(job_id, result) {
            CommitOutcome::Committed { status, records } => {
                for record in records {
                    let reference_id = record.reference_id();
                    if let Err(e) = self.store.save_item(record).await {
                        tracing::warn!("Failed to persist committed item {}: {}", reference_id, e);
                    }
                }
                self.announce_state(job_id, Some(JobState::Committing), status.state);
                self.finish_job(status).await;
            }
            CommitOutcome::NotCommitting => {
                tracing::debug!("Commit result for job {} arrived after cancellation", job_id);
            }
        }
    }

    async fn on_cancel(&mut self, notice: CancellationNotice) {
        let job_id = notice.job_id;
        if notice.should_discard_at(self.now(), self.aggregator.cancellations().window()) {
            tracing::debug!("Ignoring expired cancellation notice for job {}", job_id);
            return;
        }

        let before = self.aggregator.status(job_id).map(|status| status.state);
        match self.aggregator.cancel(job_id) {
            CancelOutcome::Cancelled {
                status,
                rolled_back,
                ..
            } => {
                let purged = self.purge_tasks(job_id);
                if purged > 0 {
                    tracing::info!("Dropped {} queued tasks for job {}", purged, job_id);
                }
                self.announce_state(job_id, before, status.state);
                self.start_rollback(job_id, &rolled_back);
                self.finish_cancelled(status, rolled_back.len()).await;
            }
            CancelOutcome::NoOp => {}
        }
    }

    fn announce_state(&self, job_id: JobId, old_state: Option<JobState>, new_state: JobState) {
        if let Some(old_state) = old_state
            && old_state != new_state
        {
            self.broadcast(PublishEvent::JobStateChanged {
                job_id,
                old_state,
                new_state,
                timestamp: Utc::now(),
            });
        }
    }

    async fn finish_job(&mut self, status: JobStatus) {
        self.jobs.remove(&status.job_id);
        self.broadcast(PublishEvent::JobCommitted {
            job_id: status.job_id,
            delivered: status.delivered,
            failed: status.failed,
            timestamp: Utc::now(),
        });
        self.persist_job(status).await;
    }

    async fn finish_cancelled(&mut self, status: JobStatus, rolled_back: usize) {
        self.jobs.remove(&status.job_id);
        self.claims.retain(|_, job_id| *job_id != status.job_id);
        self.broadcast(PublishEvent::JobCancelled {
            job_id: status.job_id,
            rolled_back,
            timestamp: Utc::now(),
        });
        self.persist_job(status).await;
    }

    async fn persist_job(&self, status: JobStatus) {
        let job_id = status.job_id;
        if let Err(e) = self.store.save_job(status).await {
            tracing::warn!("Failed to persist job status {}: {}", job_id, e);
        }
    }

    /// Delivery types touched by `records`, plus the job's own.
    fn delivery_types(&self, job_id: JobId, records: &[ItemStatus]) -> HashSet<String> {
        let mut types: HashSet<String> = records
            .iter()
            .map(|record| record.delivery_type().to_string())
            .collect();
        if let Some(job) = self.jobs.get(&job_id) {
            types.insert(job.delivery_type().to_string());
        }
        types
    }

    /// Commit the job's transactional sinks off the actor. The outcome comes
    /// back as [`QueueMessage::CommitFinished`], so a cancellation dispatched
    /// in the meantime still rolls the job back.
    fn start_commit(&self, myself: &ActorRef<QueueMessage>, job_id: JobId, prepared: &[ItemStatus]) {
        let mut commits = Vec::new();
        let mut missing = None;
        for delivery_type in self.delivery_types(job_id, prepared) {
            match self.handlers.delivery(&delivery_type) {
                Some(handler) if handler.is_transactional() => commits.push(handler.commit(job_id)),
                Some(_) => {}
                None => {
                    missing = Some(format!("No delivery handler for type: {}", delivery_type));
                    break;
                }
            }
        }

        let myself = myself.clone();
        tokio::spawn(async move {
            let result = match missing {
                Some(error) => Err(error),
                None => {
                    let errors: Vec<String> = join_all(commits)
                        .await
                        .into_iter()
                        .filter_map(Result::err)
                        .collect();
                    if errors.is_empty() {
                        Ok(())
                    } else {
                        Err(errors.join("; "))
                    }
                }
            };
            if myself
                .send_message(QueueMessage::CommitFinished { job_id, result })
                .is_err()
            {
                tracing::warn!("Dispatch queue stopped before job {} finished committing", job_id);
            }
        });
    }

    fn start_rollback(&self, job_id: JobId, rolled_back: &[ItemStatus]) {
        let rollbacks: Vec<_> = self
            .delivery_types(job_id, rolled_back)
            .into_iter()
            .filter_map(|delivery_type| self.handlers.delivery(&delivery_type))
            .filter(|handler| handler.is_transactional())
            .map(|handler| handler.rollback(job_id))
            .collect();
        if rollbacks.is_empty() {
            return;
        }

        tokio::spawn(async move {
            for result in join_all(rollbacks).await {
                if let Err(e) = result {
                    tracing::warn!("Rollback failed for job {}: {}", job_id, e);
                }
            }
        });
    }

    fn housekeeping(&mut self) {
        let cancellations = self.aggregator.cancellations().clone();
        let before = self.assembly.len() + self.delivery.len();
        self.assembly
            .retain(|task| !cancellations.is_cancelled(task.job_id()));
        self.delivery
            .retain(|task| !cancellations.is_cancelled(task.job_id()));
        let purged = before - self.assembly.len() - self.delivery.len();
        if purged > 0 {
            tracing::debug!("Purged {} tasks of cancelled jobs", purged);
        }

        let now = self.now();
        let window = cancellations.window();
        self.work_units.retain(|request_id, (_, received_at)| {
            let keep = now - *received_at <= window;
            if !keep {
                tracing::warn!("Dropping unclaimed work unit {}", request_id);
            }
            keep
        });

        let aggregator = self.aggregator.clone();
        self.jobs.retain(|job_id, _| aggregator.contains(*job_id));
    }
}

/// Dispatch queue actor.
pub struct DispatchQueue;

impl Actor for DispatchQueue {
    type Msg = QueueMessage;
    type State = DispatchQueueState;
    type Arguments = DispatchQueueArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting dispatch queue (capacity {})", args.capacity);
        Ok(DispatchQueueState::new(args))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Submit { message, reply } => {
                if state.pending.len() >= state.capacity {
                    let _ = reply.send(Err(CoordinationError::QueueFull.reply()));
                    return Ok(());
                }
                state.push(message);
                state.schedule_drain(&myself);
                let _ = reply.send(Ok(()));
            }

            QueueMessage::Report { status } => {
                state.push(PublishMessage::Item(status));
                state.schedule_drain(&myself);
            }

            QueueMessage::Deliver { task } => {
                state.delivery.push_back(*task);
            }

            QueueMessage::RequestTask {
                worker_id,
                stage,
                reply,
            } => {
                let task = state.next_task(stage);
                if let Some(task) = &task {
                    tracing::debug!(
                        "Worker {} takes {} task for job {}",
                        worker_id,
                        stage,
                        task.job_id()
                    );
                }
                let _ = reply.send(task);
            }

            QueueMessage::Drain => {
                state.drain_scheduled = false;
                for _ in 0..DRAIN_BATCH {
                    let Some(next) = state.pending.pop() else {
                        break;
                    };
                    state.dispatch(&myself, next.message).await;
                }
                if !state.pending.is_empty() {
                    state.schedule_drain(&myself);
                }
            }

            QueueMessage::CommitFinished { job_id, result } => {
                state.on_commit_finished(job_id, result).await;
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Shutdown => {
                tracing::info!(
                    "Shutting down dispatch queue with {} pending messages",
                    state.pending.len()
                );
                myself.stop(None);
                return Ok(());
            }

            QueueMessage::Tick => {
                state.housekeeping();
            }
        }

        Ok(())
    }
}
