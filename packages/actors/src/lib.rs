//! Actor system for publishing job coordination.
//!
//! This crate provides the Ractor-based actors that move publish traffic
//! through the pipeline.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor owning the queue, the workers and the
//!   job status aggregator
//! - `DispatchQueue` - Orders producer messages by priority and holds the
//!   per-stage task queues
//! - `WorkerActor` - Runs assembly or delivery tasks through the registered
//!   stage handlers
//!
//! # Usage
//!
//! ```ignore
//! use actors::{StageHandlers, SupervisorArgs, SupervisorMessage, start_supervisor};
//! use db::SurrealLogStore;
//!
//! let handlers = StageHandlers::new().with_assembler(my_assembler);
//! let args = SupervisorArgs::new(handlers, Arc::new(SurrealLogStore::new()));
//! let (supervisor, handle) = start_supervisor(args).await?;
//!
//! supervisor.send_message(SupervisorMessage::SubmitWork { ... })?;
//! ```

mod dispatch_queue;
mod handler;
mod messages;
pub mod registry;
mod supervisor;
mod tasks;
mod worker_actor;

pub use dispatch_queue::{DispatchQueue, DispatchQueueArgs};
pub use handler::{
    Assembler, DeliveryHandler, FnAssembler, FnDelivery, HandlerFuture, HandlerResult,
    StageHandlers,
};
pub use messages::{
    CoordinationError, CoordinationResult, QueueMessage, QueueStats, SupervisorMessage,
    WorkerMessage,
};
pub use registry::{ActorRegistry, global_registry};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use tasks::{AssembledItem, AssemblyTask, DeliveredItem, DeliveryTask, Stage, StageTask};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
