//! Actor registry for discovering the running supervisor.

use parking_lot::RwLock;
use ractor::ActorRef;

use crate::messages::SupervisorMessage;

/// Global actor registry.
///
/// This provides a way to look up the supervisor without passing
/// references through the entire call stack.
pub struct ActorRegistry {
    supervisor: RwLock<Option<ActorRef<SupervisorMessage>>>,
}

impl ActorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            supervisor: RwLock::new(None),
        }
    }

    /// Register the supervisor, replacing any previous one.
    pub fn register_supervisor(&self, supervisor: ActorRef<SupervisorMessage>) {
        *self.supervisor.write() = Some(supervisor);
    }

    /// Get the supervisor.
    pub fn get_supervisor(&self) -> Option<ActorRef<SupervisorMessage>> {
        self.supervisor.read().clone()
    }

    /// Forget the supervisor, returning it if one was registered.
    pub fn clear_supervisor(&self) -> Option<ActorRef<SupervisorMessage>> {
        self.supervisor.write().take()
    }
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global registry instance.
static REGISTRY: std::sync::LazyLock<ActorRegistry> = std::sync::LazyLock::new(ActorRegistry::new);

/// Get the global actor registry.
pub fn global_registry() -> &'static ActorRegistry {
    &REGISTRY
}
