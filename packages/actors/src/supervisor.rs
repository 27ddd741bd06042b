//! Supervisor actor owning the dispatch queue, the workers and the aggregator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use db::PublishLogStore;
use publish_core::{
    CancellationNotice, Clock, CoordinatorConfig, JobControlMessage, JobId, JobStatusAggregator,
    PublishEvent, PublishMessage, SystemClock,
};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::dispatch_queue::{DispatchQueue, DispatchQueueArgs};
use crate::handler::StageHandlers;
use crate::messages::{CoordinationError, QueueMessage, SupervisorMessage, WorkerMessage};
use crate::tasks::Stage;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Everything the supervisor needs to start.
pub struct SupervisorArgs {
    pub config: CoordinatorConfig,
    pub handlers: StageHandlers,
    pub store: Arc<dyn PublishLogStore>,
    pub clock: Arc<dyn Clock>,
}

impl SupervisorArgs {
    /// Default configuration and the system clock.
    pub fn new(handlers: StageHandlers, store: Arc<dyn PublishLogStore>) -> Self {
        Self {
            config: CoordinatorConfig::default(),
            handlers,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// State for the supervisor actor.
pub struct SupervisorState {
    pub queue: ActorRef<QueueMessage>,
    pub workers: Vec<ActorRef<WorkerMessage>>,
    pub aggregator: Arc<JobStatusAggregator>,
    pub store: Arc<dyn PublishLogStore>,
    /// Event broadcaster.
    pub event_tx: broadcast::Sender<PublishEvent>,
    /// Site and pub server of jobs started through this supervisor, for END.
    started: HashMap<JobId, (i64, Option<i64>)>,
    config: CoordinatorConfig,
}

impl SupervisorState {
    fn site_of(&self, job_id: JobId) -> Option<(i64, Option<i64>)> {
        self.started.get(&job_id).copied().or_else(|| {
            self.aggregator
                .status(job_id)
                .map(|status| (status.site_id, status.pub_server_id))
        })
    }
}

/// Hand a message to the dispatch queue and wait for it to be accepted.
async fn submit(queue: &ActorRef<QueueMessage>, message: PublishMessage) -> Result<(), String> {
    let (tx, rx) = ractor::concurrency::oneshot();
    queue
        .send_message(QueueMessage::Submit {
            message,
            reply: tx.into(),
        })
        .map_err(|e| CoordinationError::Actor(format!("Failed to send message: {}", e)).reply())?;

    match rx.await {
        Ok(result) => result,
        Err(_) => Err(CoordinationError::Actor("Failed to receive response".into()).reply()),
    }
}

async fn spawn_workers(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    handlers: &Arc<StageHandlers>,
) -> Result<(), ActorProcessingErr> {
    let stages = std::iter::repeat_n(Stage::Assembly, state.config.assembly_workers as usize)
        .chain(std::iter::repeat_n(
            Stage::Delivery,
            state.config.delivery_workers as usize,
        ));

    for (index, stage) in stages.enumerate() {
        let args = WorkerArgs {
            worker_id: format!("{}-worker-{}", stage, index + 1),
            stage,
            queue: state.queue.clone(),
            handlers: handlers.clone(),
            event_tx: Some(state.event_tx.clone()),
            poll_interval: state.config.poll_interval(),
            task_timeout: state.config.task_timeout(),
        };
        let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;
        state.workers.push(worker);
    }
    Ok(())
}

/// Supervisor actor.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting publishing supervisor");

        let (event_tx, _) = broadcast::channel(1024);
        let aggregator = Arc::new(JobStatusAggregator::new(&args.config, args.clock));
        let handlers = Arc::new(args.handlers);
        tracing::debug!("Stage handlers: {:?}", handlers);

        let queue_args = DispatchQueueArgs {
            aggregator: aggregator.clone(),
            store: args.store.clone(),
            handlers: handlers.clone(),
            event_tx: event_tx.clone(),
            capacity: args.config.queue_capacity,
        };
        let (queue, _handle) =
            Actor::spawn_linked(None, DispatchQueue, queue_args, myself.get_cell())
                .await
                .map_err(|e| {
                    ActorProcessingErr::from(format!("Failed to spawn dispatch queue: {}", e))
                })?;

        let mut state = SupervisorState {
            queue,
            workers: Vec::new(),
            aggregator,
            store: args.store,
            event_tx,
            started: HashMap::new(),
            config: args.config,
        };
        spawn_workers(&myself, &mut state, &handlers).await?;

        // Start periodic tick
        let myself_clone = myself.clone();
        let sweep_interval = state.config.sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                if myself_clone.send_message(SupervisorMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::SubmitWork { unit, reply } => {
                let _ = reply.send(submit(&state.queue, PublishMessage::Work(unit)).await);
            }

            SupervisorMessage::StartJob { start, reply } => {
                let start = *start;
                let job_id = start.job_id();
                let site = (start.site_id(), start.pub_server_id());
                let result = submit(&state.queue, JobControlMessage::Start(start).into()).await;
                if result.is_ok() {
                    state.started.insert(job_id, site);
                }
                let _ = reply.send(result);
            }

            SupervisorMessage::EndJob { job_id, reply } => {
                let Some((site_id, pub_server_id)) = state.site_of(job_id) else {
                    let _ = reply.send(Err(CoordinationError::JobNotFound(job_id).reply()));
                    return Ok(());
                };
                let end = JobControlMessage::End {
                    job_id,
                    site_id,
                    pub_server_id,
                };
                let result = submit(&state.queue, end.into()).await;
                if result.is_ok() {
                    state.started.remove(&job_id);
                }
                let _ = reply.send(result);
            }

            SupervisorMessage::CancelJob { job_id, reply } => {
                let now = state.aggregator.cancellations().clock().now();
                let notice = CancellationNotice::issued_at(job_id, now);
                let result = submit(&state.queue, notice.into()).await;
                if result.is_ok() {
                    state.started.remove(&job_id);
                }
                let _ = reply.send(result);
            }

            SupervisorMessage::ReportItem { status, reply } => {
                let _ = reply.send(submit(&state.queue, PublishMessage::Item(status)).await);
            }

            SupervisorMessage::GetJobStatus { job_id, reply } => {
                if let Some(status) = state.aggregator.status(job_id) {
                    let _ = reply.send(Ok(Some(status)));
                    return Ok(());
                }
                let result = state
                    .store
                    .job(job_id)
                    .await
                    .map_err(|e| CoordinationError::Database(e).reply());
                let _ = reply.send(result);
            }

            SupervisorMessage::GetItemStatus {
                reference_ids,
                reply,
            } => {
                let result = state
                    .store
                    .items(reference_ids)
                    .await
                    .map_err(|e| CoordinationError::Database(e).reply());
                let _ = reply.send(result);
            }

            SupervisorMessage::FindReferenceIds {
                job_id,
                sort,
                reply,
            } => {
                let result = state
                    .store
                    .reference_ids_for_job(job_id, sort)
                    .await
                    .map_err(|e| CoordinationError::Database(e).reply());
                let _ = reply.send(result);
            }

            SupervisorMessage::GetQueueStats { reply } => {
                let result = ractor::rpc::call(
                    &state.queue,
                    |reply| QueueMessage::GetStats { reply },
                    Some(Duration::from_secs(5)),
                )
                .await;
                let result = match result {
                    Ok(ractor::rpc::CallResult::Success(stats)) => Ok(stats),
                    Ok(_) => Err(CoordinationError::Timeout.reply()),
                    Err(e) => Err(CoordinationError::Actor(e.to_string()).reply()),
                };
                let _ = reply.send(result);
            }

            SupervisorMessage::Subscribe { sender } => {
                // Merge event streams - forward from our channel to subscriber's
                let mut rx = state.event_tx.subscribe();
                tokio::spawn(async move {
                    while let Ok(event) = rx.recv().await {
                        if sender.send(event).is_err() {
                            break;
                        }
                    }
                });
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down publishing supervisor");
                for worker in &state.workers {
                    let _ = worker.send_message(WorkerMessage::Shutdown);
                }
                let _ = state.queue.send_message(QueueMessage::Shutdown);
                myself.stop(None);
                return Ok(());
            }

            SupervisorMessage::Tick => {
                let report = state.aggregator.sweep();
                if !report.notices_dropped.is_empty() || report.orphans_dropped > 0 {
                    tracing::info!(
                        "Swept {} cancellation notices and {} orphan records",
                        report.notices_dropped.len(),
                        report.orphans_dropped
                    );
                }
                let evicted = state
                    .aggregator
                    .evict_finished(state.config.discard_window());
                if evicted > 0 {
                    tracing::debug!("Evicted {} finished jobs from memory", evicted);
                }
                let aggregator = state.aggregator.clone();
                state.started.retain(|job_id, _| {
                    aggregator
                        .status(*job_id)
                        .is_none_or(|status| !status.state.is_ended())
                });
                let _ = state.queue.send_message(QueueMessage::Tick);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!("Child actor {} stopped: {:?}", cell.get_id(), reason);
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                tracing::warn!("Child actor {} failed: {}", cell.get_id(), error);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let (actor, handle) = Actor::spawn(None, Supervisor, args).await?;

    Ok((actor, handle))
}
