//! Worker actor for running assembly and delivery tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use publish_core::{ItemState, ItemStatus, ItemStatusBuilder, JobId, PublishEvent};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::handler::StageHandlers;
use crate::messages::{QueueMessage, WorkerMessage};
use crate::tasks::{AssemblyTask, DeliveryTask, Stage, StageTask, item_status};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Stage this worker serves.
    pub stage: Stage,
    /// Job of the task being processed.
    pub current_job: Option<JobId>,
    /// Dispatch queue reference.
    pub queue: ActorRef<QueueMessage>,
    pub handlers: Arc<StageHandlers>,
    pub event_tx: Option<broadcast::Sender<PublishEvent>>,
    pub task_timeout: Duration,
    /// Whether the worker should continue running.
    pub running: bool,
}

impl WorkerActorState {
    /// Check if the worker is idle.
    pub fn is_idle(&self) -> bool {
        self.current_job.is_none()
    }

    fn broadcast(&self, event: PublishEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Build a record and hand it to the dispatch queue.
    fn report(&self, builder: ItemStatusBuilder) -> Result<Option<ItemStatus>, ActorProcessingErr> {
        let status = match builder.build() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Worker {} produced an invalid record: {}", self.worker_id, e);
                return Ok(None);
            }
        };
        self.queue.send_message(QueueMessage::Report {
            status: Box::new(status.clone()),
        })?;
        Ok(Some(status))
    }

    async fn run_assembly(&self, task: AssemblyTask) -> Result<(), ActorProcessingErr> {
        let started = Instant::now();
        let Some(assembler) = self.handlers.assembler() else {
            self.report(
                item_status(&task.job, task.item, ItemState::Failed)
                    .message("No assembler registered"),
            )?;
            return Ok(());
        };

        let outcome = tokio::time::timeout(self.task_timeout, assembler.assemble(&task)).await;
        let elapsed = started.elapsed().as_millis() as u64;
        let failed = |error: String| {
            item_status(&task.job, task.item, ItemState::Failed)
                .elapsed_millis(elapsed)
                .message(error)
        };

        let assembled = match outcome {
            Ok(Ok(assembled)) if assembled.pages.is_empty() => {
                self.report(failed("Assembly produced no output".to_string()))?;
                return Ok(());
            }
            Ok(Ok(assembled)) => assembled,
            Ok(Err(error)) => {
                self.report(failed(error))?;
                return Ok(());
            }
            Err(_) => {
                self.report(failed(format!(
                    "Assembly timed out after {:?}",
                    self.task_timeout
                )))?;
                return Ok(());
            }
        };

        let mut builder =
            item_status(&task.job, task.item, ItemState::Assembled).elapsed_millis(elapsed);
        if let Some(url) = &assembled.assembly_url {
            builder = builder.assembly_url(url.clone());
        }
        if let Some(template_id) = assembled.template_id {
            builder = builder.template(template_id);
        }
        let Some(record) = self.report(builder)? else {
            return Ok(());
        };

        for (index, body) in assembled.pages.into_iter().enumerate() {
            let page = index as i32 + 1;
            let delivery = DeliveryTask {
                job: task.job.clone(),
                item: task.item,
                template_id: assembled.template_id,
                assembly_url: assembled.assembly_url.clone(),
                page,
                parent: (page > 1).then(|| record.reference_id()),
                body,
            };
            self.queue.send_message(QueueMessage::Deliver {
                task: Box::new(delivery),
            })?;
        }
        Ok(())
    }

    async fn run_delivery(&self, task: DeliveryTask) -> Result<(), ActorProcessingErr> {
        let started = Instant::now();
        let Some(handler) = self.handlers.delivery(task.delivery_type()) else {
            self.report(
                delivery_status(&task, ItemState::Failed).message(format!(
                    "No delivery handler for type: {}",
                    task.delivery_type()
                )),
            )?;
            return Ok(());
        };

        let outcome = tokio::time::timeout(self.task_timeout, handler.deliver(&task)).await;
        let elapsed = started.elapsed().as_millis() as u64;

        let builder = match outcome {
            Ok(Ok(delivered)) => {
                let state = if handler.is_transactional() {
                    ItemState::Prepared
                } else if task.job.is_publish() {
                    ItemState::Delivered
                } else {
                    ItemState::Unpublished
                };
                delivery_status(&task, state)
                    .published_location(delivered.location)
                    .unpublishing_information(delivered.unpublishing_information)
            }
            Ok(Err(error)) => delivery_status(&task, ItemState::Failed).message(error),
            Err(_) => delivery_status(&task, ItemState::Failed).message(format!(
                "Delivery timed out after {:?}",
                self.task_timeout
            )),
        };
        self.report(builder.elapsed_millis(elapsed))?;
        Ok(())
    }
}

/// Record for a delivery task, carrying page linkage for expanded pages.
fn delivery_status(task: &DeliveryTask, state: ItemState) -> ItemStatusBuilder {
    let mut builder = item_status(&task.job, task.item, state);
    if let Some(template_id) = task.template_id {
        builder = builder.template(template_id);
    }
    if let Some(url) = &task.assembly_url {
        builder = builder.assembly_url(url.clone());
    }
    if let Some(parent) = task.parent {
        builder = builder.page(task.page).parent_page(parent);
    }
    builder
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub stage: Stage,
    pub queue: ActorRef<QueueMessage>,
    pub handlers: Arc<StageHandlers>,
    pub event_tx: Option<broadcast::Sender<PublishEvent>>,
    pub poll_interval: Duration,
    pub task_timeout: Duration,
}

/// Worker actor that pulls stage tasks from the dispatch queue.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting {} worker: {}", args.stage, args.worker_id);

        let state = WorkerActorState {
            worker_id: args.worker_id,
            stage: args.stage,
            current_job: None,
            queue: args.queue,
            handlers: args.handlers,
            event_tx: args.event_tx,
            task_timeout: args.task_timeout,
            running: true,
        };
        state.broadcast(PublishEvent::WorkerConnected {
            worker_id: state.worker_id.clone(),
            stage: state.stage.to_string(),
            timestamp: Utc::now(),
        });

        // Start the work loop
        let myself_clone = myself.clone();
        let poll_interval = args.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if myself_clone.send_message(WorkerMessage::Heartbeat).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.broadcast(PublishEvent::WorkerDisconnected {
            worker_id: state.worker_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::ProcessTask { task } => {
                state.current_job = Some(task.job_id());
                let result = match *task {
                    StageTask::Assembly(task) => state.run_assembly(task).await,
                    StageTask::Delivery(task) => state.run_delivery(task).await,
                };
                state.current_job = None;
                result?;
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                state.running = false;
                myself.stop(None);
                return Ok(());
            }

            WorkerMessage::Heartbeat => {
                if !state.running {
                    myself.stop(None);
                    return Ok(());
                }

                // If idle, request a task
                if state.is_idle() {
                    let timeout = Duration::from_secs(5);
                    let result = ractor::rpc::call(
                        &state.queue,
                        |reply| QueueMessage::RequestTask {
                            worker_id: state.worker_id.clone(),
                            stage: state.stage,
                            reply,
                        },
                        Some(timeout),
                    )
                    .await;
                    if let Ok(ractor::rpc::CallResult::Success(Some(task))) = result {
                        myself.send_message(WorkerMessage::ProcessTask {
                            task: Box::new(task),
                        })?;
                    }
                }
            }
        }

        Ok(())
    }
}
