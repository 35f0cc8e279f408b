//! Active-turn tracking.
//!
//! The active turn id is set by `turn_started` (or harvested from the
//! `turn/start` response) and cleared by any terminal event. Tail-progress
//! events arriving while a turn is active are logged so peers that drop
//! their terminal notification are visible in the logs.

use cdx_core::{extract_turn_id, is_retryable_stream_error, types, AgentId};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Events that end the active turn unconditionally.
const TERMINAL_EVENTS: &[&str] = &[
    types::TURN_COMPLETE,
    types::TURN_ABORTED,
    types::IDLE,
    types::ERROR,
    types::SHUTDOWN_COMPLETE,
];

/// Progress events that should only arrive inside an active turn.
const TAIL_EVENTS: &[&str] = &[
    types::TURN_DIFF_UPDATED,
    types::TURN_PLAN_UPDATED,
    types::PLAN_DELTA,
    types::PLAN_UPDATE,
];

pub(crate) struct TurnTracker {
    agent_id: AgentId,
    active: RwLock<Option<Arc<str>>>,
}

impl TurnTracker {
    pub(crate) fn new(agent_id: AgentId) -> Self {
        Self { agent_id, active: RwLock::new(None) }
    }

    pub(crate) fn active(&self) -> Option<Arc<str>> {
        self.active.read().clone()
    }

    pub(crate) fn set(&self, turn_id: &str) {
        tracing::debug!(agent_id = %self.agent_id, turn_id, "turn active");
        *self.active.write() = Some(Arc::from(turn_id));
    }

    pub(crate) fn clear(&self, reason: &str) {
        let prev = self.active.write().take();
        if let Some(turn_id) = prev {
            tracing::debug!(agent_id = %self.agent_id, %turn_id, reason, "turn cleared");
        }
    }

    /// Update tracking from one mapped inbound event.
    pub(crate) fn observe(&self, event_type: &str, params: &Value) {
        if event_type == types::TURN_STARTED {
            match extract_turn_id(params) {
                Some(id) => self.set(&id),
                None => {
                    tracing::warn!(
                        agent_id = %self.agent_id,
                        "turn_started without a recognizable turn id"
                    );
                }
            }
            return;
        }

        if TERMINAL_EVENTS.contains(&event_type) {
            self.clear(event_type);
            return;
        }

        if event_type == types::STREAM_ERROR {
            if !is_retryable_stream_error(params) {
                self.clear(event_type);
            }
            return;
        }

        if TAIL_EVENTS.contains(&event_type) {
            if let Some(turn_id) = self.active() {
                // Surfaces peers that keep streaming progress after
                // dropping the terminal notification.
                tracing::info!(
                    agent_id = %self.agent_id,
                    %turn_id,
                    event_type,
                    "tail progress without terminal yet"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;
