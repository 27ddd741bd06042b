//! System initialization for publishing coordination.

use std::sync::{Arc, LazyLock};

use actors::{
    ActorRef, RpcReplyPort, StageHandlers, SupervisorArgs, SupervisorMessage, global_registry,
    start_supervisor,
};
use db::{DbConfig, PublishLogStore, SurrealLogStore};
use parking_lot::RwLock;
use publish_core::CoordinatorConfig;
use tracing_subscriber::EnvFilter;

use crate::{ApiError, ApiResult};

/// The log store and page cap the running coordinator was started with.
struct LogContext {
    store: Arc<dyn PublishLogStore>,
    max_page_size: usize,
}

static LOG_CONTEXT: LazyLock<RwLock<Option<LogContext>>> = LazyLock::new(|| RwLock::new(None));

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Initialize publishing coordination.
///
/// Connects the database, then starts the supervisor with configuration
/// read from `PUBLISH_*` variables. `PUBLISH_DATA_DIR` selects file storage,
/// which needs the `rocksdb` feature; otherwise the log is kept in memory.
/// This should be called once at startup.
pub async fn init_publishing(handlers: StageHandlers) -> ApiResult<ActorRef<SupervisorMessage>> {
    tracing::info!("Initializing publishing coordination...");

    let db_config = match std::env::var("PUBLISH_DATA_DIR") {
        Ok(dir) => DbConfig::file(dir),
        Err(_) => DbConfig::memory(),
    };
    db::init(db_config).await?;

    let supervisor = start_publishing(
        CoordinatorConfig::from_env(),
        handlers,
        Arc::new(SurrealLogStore::new()),
    )
    .await?;

    tracing::info!("Publishing coordination initialized");
    Ok(supervisor)
}

/// Start a supervisor over `store` and register it globally.
///
/// A previously registered supervisor is shut down. Idle log cursors are
/// swept on the supervisor's interval while it stays registered.
pub async fn start_publishing(
    config: CoordinatorConfig,
    handlers: StageHandlers,
    store: Arc<dyn PublishLogStore>,
) -> ApiResult<ActorRef<SupervisorMessage>> {
    let max_page_size = config.max_page_size;
    let sweep_interval = config.sweep_interval();
    let cursor_idle = config.cursor_idle();
    let args = SupervisorArgs::new(handlers, store.clone()).with_config(config);
    let (supervisor, _handle) = start_supervisor(args)
        .await
        .map_err(|e| ApiError::Startup(e.to_string()))?;

    if let Some(previous) = global_registry().clear_supervisor() {
        tracing::info!("Replacing running supervisor");
        let _ = previous.send_message(SupervisorMessage::Shutdown);
    }
    global_registry().register_supervisor(supervisor.clone());
    *LOG_CONTEXT.write() = Some(LogContext {
        store,
        max_page_size,
    });

    let supervisor_id = supervisor.get_id();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            if global_registry().get_supervisor().map(|s| s.get_id()) != Some(supervisor_id) {
                break;
            }
            crate::logs::evict_idle_cursors(cursor_idle);
        }
    });

    Ok(supervisor)
}

/// Stop the registered supervisor, if any.
pub fn shutdown_publishing() {
    if let Some(supervisor) = global_registry().clear_supervisor() {
        tracing::info!("Shutting down publishing coordination");
        let _ = supervisor.send_message(SupervisorMessage::Shutdown);
    }
}

/// The registered supervisor.
pub(crate) fn supervisor() -> ApiResult<ActorRef<SupervisorMessage>> {
    global_registry()
        .get_supervisor()
        .ok_or(ApiError::SupervisorUnavailable)
}

/// Send a request to the supervisor and wait for its reply.
pub(crate) async fn request<T, F>(build: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> SupervisorMessage,
{
    let supervisor = supervisor()?;
    let (tx, rx) = actors::concurrency::oneshot();
    supervisor
        .send_message(build(tx.into()))
        .map_err(|e| ApiError::Send(e.to_string()))?;

    rx.await.map_err(|_| ApiError::NoResponse)
}

/// Store and page cap for log cursors.
pub(crate) fn log_context() -> (Arc<dyn PublishLogStore>, usize) {
    match LOG_CONTEXT.read().as_ref() {
        Some(context) => (context.store.clone(), context.max_page_size),
        None => (
            Arc::new(SurrealLogStore::new()),
            CoordinatorConfig::default().max_page_size,
        ),
    }
}
