//! Stage handler traits and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use publish_core::JobId;

use crate::tasks::{AssembledItem, AssemblyTask, DeliveredItem, DeliveryTask};

/// Result type for stage handlers.
pub type HandlerResult<T> = Result<T, String>;

/// Future type for async stage handlers.
pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = HandlerResult<T>> + Send>>;

/// Renders items.
///
/// Implement this trait to plug the content assembly step into the
/// pipeline. An `Err` becomes a `Failed` item status carrying the message.
pub trait Assembler: Send + Sync + 'static {
    fn assemble(&self, task: &AssemblyTask) -> HandlerFuture<AssembledItem>;
}

/// Writes rendered pages to one kind of destination.
///
/// Transactional sinks stage each delivery and report it as `Prepared`;
/// the staged results are made visible by [`commit`](Self::commit) when the
/// job ends, or discarded by [`rollback`](Self::rollback) on cancellation.
pub trait DeliveryHandler: Send + Sync + 'static {
    /// The delivery type this handler serves.
    fn delivery_type(&self) -> &str;

    fn deliver(&self, task: &DeliveryTask) -> HandlerFuture<DeliveredItem>;

    fn is_transactional(&self) -> bool {
        false
    }

    fn commit(&self, _job_id: JobId) -> HandlerFuture<()> {
        Box::pin(async { Ok(()) })
    }

    fn rollback(&self, _job_id: JobId) -> HandlerFuture<()> {
        Box::pin(async { Ok(()) })
    }
}

/// Registry for stage handlers.
///
/// Holds at most one assembler and one delivery handler per delivery type.
#[derive(Default)]
pub struct StageHandlers {
    assembler: Option<Arc<dyn Assembler>>,
    delivery: HashMap<String, Arc<dyn DeliveryHandler>>,
}

impl StageHandlers {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the assembler.
    pub fn with_assembler<A: Assembler>(mut self, assembler: A) -> Self {
        self.assembler = Some(Arc::new(assembler));
        self
    }

    /// Register a delivery handler for its delivery type.
    pub fn with_delivery<H: DeliveryHandler>(mut self, handler: H) -> Self {
        self.register_delivery(handler);
        self
    }

    /// Register a delivery handler, replacing any for the same type.
    pub fn register_delivery<H: DeliveryHandler>(&mut self, handler: H) {
        let delivery_type = handler.delivery_type().to_string();
        self.delivery.insert(delivery_type, Arc::new(handler));
    }

    pub fn assembler(&self) -> Option<Arc<dyn Assembler>> {
        self.assembler.clone()
    }

    /// Get the handler for a delivery type.
    pub fn delivery(&self, delivery_type: &str) -> Option<Arc<dyn DeliveryHandler>> {
        self.delivery.get(delivery_type).cloned()
    }

    /// List all registered delivery types.
    pub fn delivery_types(&self) -> Vec<&str> {
        self.delivery.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for StageHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandlers")
            .field("assembler", &self.assembler.is_some())
            .field("delivery", &self.delivery_types())
            .finish()
    }
}

/// A simple function-based assembler.
pub struct FnAssembler<F>
where
    F: Fn(&AssemblyTask) -> HandlerFuture<AssembledItem> + Send + Sync + 'static,
{
    assemble: F,
}

impl<F> FnAssembler<F>
where
    F: Fn(&AssemblyTask) -> HandlerFuture<AssembledItem> + Send + Sync + 'static,
{
    pub fn new(assemble: F) -> Self {
        Self { assemble }
    }
}

impl<F> Assembler for FnAssembler<F>
where
    F: Fn(&AssemblyTask) -> HandlerFuture<AssembledItem> + Send + Sync + 'static,
{
    fn assemble(&self, task: &AssemblyTask) -> HandlerFuture<AssembledItem> {
        (self.assemble)(task)
    }
}

/// A simple function-based, non-transactional delivery handler.
pub struct FnDelivery<F>
where
    F: Fn(&DeliveryTask) -> HandlerFuture<DeliveredItem> + Send + Sync + 'static,
{
    delivery_type: String,
    deliver: F,
}

impl<F> FnDelivery<F>
where
    F: Fn(&DeliveryTask) -> HandlerFuture<DeliveredItem> + Send + Sync + 'static,
{
    pub fn new(delivery_type: impl Into<String>, deliver: F) -> Self {
        Self {
            delivery_type: delivery_type.into(),
            deliver,
        }
    }
}

impl<F> DeliveryHandler for FnDelivery<F>
where
    F: Fn(&DeliveryTask) -> HandlerFuture<DeliveredItem> + Send + Sync + 'static,
{
    fn delivery_type(&self) -> &str {
        &self.delivery_type
    }

    fn deliver(&self, task: &DeliveryTask) -> HandlerFuture<DeliveredItem> {
        (self.deliver)(task)
    }
}
