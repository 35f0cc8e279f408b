//! Event sink registration and dispatch.

use cdx_core::{AgentEvent, AgentId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Handler invoked for every delivered event, in network-receive order.
pub type EventHandler = Arc<dyn Fn(AgentEvent) + Send + Sync>;

/// Single-slot event handler.
///
/// Dispatch copies the handler out under the read lock and releases before
/// invoking, so a slow handler never blocks replacement.
pub(crate) struct EventSink {
    agent_id: AgentId,
    slot: RwLock<Option<EventHandler>>,
}

impl EventSink {
    pub(crate) fn new(agent_id: AgentId) -> Self {
        Self { agent_id, slot: RwLock::new(None) }
    }

    pub(crate) fn set(&self, handler: EventHandler) {
        *self.slot.write() = Some(handler);
    }

    /// Deliver one event. Events arriving before a handler is registered
    /// are dropped, not queued.
    pub(crate) fn dispatch(&self, event: AgentEvent) {
        let handler = { self.slot.read().clone() };
        match handler {
            Some(h) => h(event),
            None => {
                tracing::warn!(
                    agent_id = %self.agent_id,
                    event_type = %event.event_type,
                    "no event handler registered, dropping event"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
