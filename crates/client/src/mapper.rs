//! Inbound method mapping with legacy-mirror suppression.
//!
//! Thin stateful shell over the pure dictionary and normalizers: it owns
//! the mirror-drop counter for sampled logging and decides per frame
//! whether the sink sees anything at all.

use cdx_core::{
    event_type_for_method, legacy_mirror, normalize_error_payload, short, types, AgentId,
    MethodMatch,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of mapping one inbound method frame.
#[derive(Debug)]
pub(crate) enum Mapped {
    /// Deliver to the turn tracker and sink.
    Event { event_type: String, params: Value },
    /// Legacy mirror of a v2 delta; suppressed.
    DroppedMirror,
}

pub(crate) struct EventMapper {
    agent_id: AgentId,
    mirror_drops: AtomicU64,
}

impl EventMapper {
    pub(crate) fn new(agent_id: AgentId) -> Self {
        Self { agent_id, mirror_drops: AtomicU64::new(0) }
    }

    pub(crate) fn map(&self, method: &str, mut params: Value) -> Mapped {
        if let Some(mirror) = legacy_mirror(method, &params) {
            let n = self.mirror_drops.fetch_add(1, Ordering::Relaxed) + 1;
            if sample_mirror_drop(n) {
                tracing::info!(
                    agent_id = %self.agent_id,
                    method,
                    conversation_id = %mirror.conversation_id,
                    preview = %mirror.preview,
                    dropped = n,
                    "suppressing legacy mirror of v2 delta"
                );
            } else {
                tracing::debug!(
                    agent_id = %self.agent_id,
                    method,
                    conversation_id = %mirror.conversation_id,
                    dropped = n,
                    "suppressing legacy mirror of v2 delta"
                );
            }
            return Mapped::DroppedMirror;
        }

        let matched = event_type_for_method(method);
        if let MethodMatch::Unmatched(_) = matched {
            tracing::warn!(
                agent_id = %self.agent_id,
                method,
                params = %short(&params.to_string(), 200),
                "unmapped inbound method, passing through"
            );
        }

        let mut event_type = matched.event_type().to_string();
        if event_type == types::ERROR {
            event_type = normalize_error_payload(&mut params).to_string();
        }

        Mapped::Event { event_type, params }
    }

    #[cfg(test)]
    pub(crate) fn mirror_drop_count(&self) -> u64 {
        self.mirror_drops.load(Ordering::Relaxed)
    }
}

/// Mirror drops log at INFO on the first occurrence and every 100th after
/// that; everything in between stays at DEBUG.
fn sample_mirror_drop(n: u64) -> bool {
    n == 1 || n % 100 == 0
}

#[cfg(test)]
#[path = "mapper_tests.rs"]
mod tests;
