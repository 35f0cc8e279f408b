//! Event envelope and the internal event-type taxonomy.
//!
//! Inbound protocol frames are translated into [`AgentEvent`] values carrying
//! a stable internal event type plus the raw parameters. Server-originated
//! requests additionally carry the originating RPC id and two bound closures:
//! one replying with a JSON-RPC error, one auto-denying an approval. The
//! closures close over the transport client, so the envelope never owns a
//! back-pointer.

pub mod methods;
pub mod normalize;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Replies to the originating server request with a JSON-RPC error
/// (code, message). Fire-and-forget.
pub type RespondErrorFn = Arc<dyn Fn(i64, String) + Send + Sync>;

/// Auto-denies the approval carried by the originating server request by
/// submitting a "no" turn. Fire-and-forget.
pub type DenyFn = Arc<dyn Fn() + Send + Sync>;

/// Stable internal event-type names.
///
/// These are the strings consumers switch on; they never track peer method
/// renames. Everything not listed here passes through under its wire name.
pub mod types {
    pub const THREAD_STARTED: &str = "thread_started";
    pub const TURN_STARTED: &str = "turn_started";
    pub const TURN_COMPLETE: &str = "turn_complete";
    pub const TURN_ABORTED: &str = "turn_aborted";
    pub const TURN_FAILED: &str = "turn_failed";
    pub const TURN_DIFF_UPDATED: &str = "turn_diff_updated";
    pub const TURN_PLAN_UPDATED: &str = "turn_plan_updated";
    pub const PLAN_DELTA: &str = "plan_delta";
    pub const PLAN_UPDATE: &str = "plan_update";
    pub const IDLE: &str = "idle";
    pub const ERROR: &str = "error";
    pub const STREAM_ERROR: &str = "stream_error";
    pub const SHUTDOWN_COMPLETE: &str = "shutdown_complete";
    pub const BACKGROUND_EVENT: &str = "background_event";
    pub const TASK_STARTED: &str = "task_started";
    pub const TASK_COMPLETE: &str = "task_complete";
    pub const AGENT_MESSAGE: &str = "agent_message";
    pub const AGENT_MESSAGE_DELTA: &str = "agent_message_delta";
    pub const REASONING: &str = "agent_reasoning";
    pub const REASONING_DELTA: &str = "agent_reasoning_delta";
    pub const REASONING_SUMMARY_DELTA: &str = "agent_reasoning_summary_delta";
    pub const REASONING_RAW_DELTA: &str = "agent_reasoning_raw_content_delta";
    pub const ITEM_STARTED: &str = "item_started";
    pub const ITEM_UPDATED: &str = "item_updated";
    pub const ITEM_COMPLETED: &str = "item_completed";
    pub const EXEC_BEGIN: &str = "exec_command_begin";
    pub const EXEC_OUTPUT_DELTA: &str = "exec_command_output_delta";
    pub const EXEC_END: &str = "exec_command_end";
    pub const EXEC_APPROVAL_REQUEST: &str = "exec_approval_request";
    pub const PATCH_APPLY_BEGIN: &str = "patch_apply_begin";
    pub const PATCH_APPLY_END: &str = "patch_apply_end";
    pub const PATCH_APPROVAL_REQUEST: &str = "patch_approval_request";
    pub const DYNAMIC_TOOL_CALL: &str = "dynamic_tool_call";
    pub const TOOL_USER_INPUT_REQUEST: &str = "tool_user_input_request";
    pub const AUTH_TOKENS_REFRESH: &str = "auth_tokens_refresh";
    pub const MCP_TOOL_BEGIN: &str = "mcp_tool_call_begin";
    pub const MCP_TOOL_END: &str = "mcp_tool_call_end";
    pub const WEB_SEARCH_BEGIN: &str = "web_search_begin";
    pub const WEB_SEARCH_END: &str = "web_search_end";
    pub const TOKEN_COUNT: &str = "token_count";
    pub const SESSION_CONFIGURED: &str = "session_configured";
    pub const RAW_RESPONSE_ITEM: &str = "raw_response_item";
}

/// One inbound (or synthesized) event delivered to the registered sink.
#[derive(Clone)]
pub struct AgentEvent {
    /// Stable internal event type, or the wire method name for passthroughs.
    pub event_type: String,
    /// Raw parameter payload, post-normalization.
    pub params: Value,
    /// Originating RPC id. Present iff the inbound frame was a server
    /// request; the peer is blocked until someone replies.
    pub request_id: Option<i64>,
    /// Replies to `request_id` with a JSON-RPC error. Consumers that do not
    /// handle a server request MUST call this to unblock the peer.
    pub respond_error: Option<RespondErrorFn>,
    /// Auto-denies an approval request by submitting a "no" turn.
    pub deny: Option<DenyFn>,
}

impl AgentEvent {
    /// A plain notification event with no server-request obligations.
    pub fn notification(event_type: impl Into<String>, params: Value) -> Self {
        Self {
            event_type: event_type.into(),
            params,
            request_id: None,
            respond_error: None,
            deny: None,
        }
    }

    /// True when the event originated as a server request awaiting a reply.
    pub fn is_server_request(&self) -> bool {
        self.request_id.is_some()
    }
}

impl fmt::Debug for AgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentEvent")
            .field("event_type", &self.event_type)
            .field("params", &self.params)
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Phase of a synthesized reconnection-progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundStatus {
    Reconnecting,
    Completed,
    Failed,
}

impl BackgroundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundStatus::Reconnecting => "reconnecting",
            BackgroundStatus::Completed => "completed",
            BackgroundStatus::Failed => "failed",
        }
    }
}

/// Build the payload for a reconnection-progress background event.
///
/// One shape for every phase so consumers render them uniformly.
pub fn background_payload(
    message: &str,
    status: BackgroundStatus,
    phase: &str,
    trigger: &str,
    attempt: u32,
    max_retries: u32,
) -> Value {
    let (active, done) = match status {
        BackgroundStatus::Reconnecting => (true, false),
        BackgroundStatus::Completed | BackgroundStatus::Failed => (false, true),
    };
    serde_json::json!({
        "message": message,
        "status": status.as_str(),
        "active": active,
        "done": done,
        "phase": phase,
        "trigger": trigger,
        "attempt": attempt,
        "max_retries": max_retries,
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
