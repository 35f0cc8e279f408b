//! Wire method → internal event-type dictionary.
//!
//! Three tiers: explicit entries, prefix passthroughs, and a logged
//! passthrough for anything else. Explicit entries shadow prefix defaults.
//! The table is process-wide immutable; nothing else in the workspace holds
//! global state.

use super::types;

/// Prefixes whose methods pass through under their wire name when no
/// explicit entry matches.
pub const PASSTHROUGH_PREFIXES: &[&str] = &[
    "thread/",
    "turn/",
    "item/",
    "account/",
    "app/",
    "mcpServer/",
    "fuzzyFileSearch/",
    "rawResponseItem/",
    "windows/",
    "codex/event/",
    "agent/event/",
];

/// Explicit method → event-type entries.
///
/// Layout: current v2 methods first, then the legacy `codex/event/*`
/// envelope aliases older peers still emit. Both tiers resolve to the same
/// internal taxonomy so consumers never see the wire spelling change.
static METHOD_MAP: &[(&str, &str)] = &[
    // -- v2 thread lifecycle --
    ("thread/started", types::THREAD_STARTED),
    ("thread/resumed", "thread_resumed"),
    ("thread/forked", "thread_forked"),
    ("thread/archived", "thread_archived"),
    ("thread/metadata/updated", "thread_metadata_updated"),
    ("thread/tokenCount/updated", types::TOKEN_COUNT),
    ("thread/compacted", "thread_compacted"),
    ("thread/rollout/updated", "thread_rollout_updated"),
    // -- v2 turn lifecycle --
    ("turn/started", types::TURN_STARTED),
    ("turn/completed", types::TURN_COMPLETE),
    ("turn/aborted", types::TURN_ABORTED),
    ("turn/failed", types::TURN_FAILED),
    ("turn/diff/updated", types::TURN_DIFF_UPDATED),
    ("turn/plan/updated", types::TURN_PLAN_UPDATED),
    ("turn/usage/updated", types::TOKEN_COUNT),
    // -- v2 item stream --
    ("item/started", types::ITEM_STARTED),
    ("item/updated", types::ITEM_UPDATED),
    ("item/completed", types::ITEM_COMPLETED),
    ("item/agentMessage/delta", types::AGENT_MESSAGE_DELTA),
    ("item/reasoning/delta", types::REASONING_DELTA),
    ("item/reasoning/summaryDelta", types::REASONING_SUMMARY_DELTA),
    ("item/reasoning/rawContentDelta", types::REASONING_RAW_DELTA),
    ("item/commandExecution/outputDelta", types::EXEC_OUTPUT_DELTA),
    ("item/commandExecution/terminated", types::EXEC_END),
    ("item/fileChange/outputDelta", "file_change_output_delta"),
    ("item/plan/delta", types::PLAN_DELTA),
    ("item/plan/updated", types::PLAN_UPDATE),
    ("item/webSearch/began", types::WEB_SEARCH_BEGIN),
    ("item/webSearch/completed", types::WEB_SEARCH_END),
    ("item/mcpToolCall/began", types::MCP_TOOL_BEGIN),
    ("item/mcpToolCall/completed", types::MCP_TOOL_END),
    // -- v2 server requests --
    ("item/commandExecution/requestApproval", types::EXEC_APPROVAL_REQUEST),
    ("item/fileChange/requestApproval", types::PATCH_APPROVAL_REQUEST),
    ("item/tool/call", types::DYNAMIC_TOOL_CALL),
    ("item/tool/requestUserInput", types::TOOL_USER_INPUT_REQUEST),
    ("account/chatgptAuthTokens/refresh", types::AUTH_TOKENS_REFRESH),
    ("account/login/completed", "login_completed"),
    ("account/rateLimits/updated", "rate_limits_updated"),
    ("applyPatchApproval", types::PATCH_APPROVAL_REQUEST),
    ("execCommandApproval", types::EXEC_APPROVAL_REQUEST),
    // -- top-level notifications --
    ("error", types::ERROR),
    ("idle", types::IDLE),
    ("shutdown/complete", types::SHUTDOWN_COMPLETE),
    ("sessionConfigured", types::SESSION_CONFIGURED),
    ("loginChatGptComplete", "login_completed"),
    ("authStatusChange", "auth_status_change"),
    // -- legacy codex/event/* aliases --
    ("codex/event/session_configured", types::SESSION_CONFIGURED),
    ("codex/event/task_started", types::TASK_STARTED),
    // task_complete stays distinct from turn_complete: v2 peers emit
    // turn/completed alongside it, and folding the two would fire terminal
    // turn handling twice for one turn. Consumers see both, separately.
    ("codex/event/task_complete", types::TASK_COMPLETE),
    ("codex/event/turn_started", types::TURN_STARTED),
    ("codex/event/turn_complete", types::TURN_COMPLETE),
    ("codex/event/turn_aborted", types::TURN_ABORTED),
    ("codex/event/turn_failed", types::TURN_FAILED),
    ("codex/event/turn_diff", types::TURN_DIFF_UPDATED),
    ("codex/event/idle", types::IDLE),
    ("codex/event/error", types::ERROR),
    ("codex/event/stream_error", types::STREAM_ERROR),
    ("codex/event/shutdown_complete", types::SHUTDOWN_COMPLETE),
    ("codex/event/background_event", types::BACKGROUND_EVENT),
    ("codex/event/agent_message", types::AGENT_MESSAGE),
    ("codex/event/agent_message_delta", types::AGENT_MESSAGE_DELTA),
    ("codex/event/agent_message_content_delta", types::AGENT_MESSAGE_DELTA),
    ("codex/event/agent_reasoning", types::REASONING),
    ("codex/event/agent_reasoning_delta", types::REASONING_DELTA),
    ("codex/event/agent_reasoning_section_break", "agent_reasoning_section_break"),
    ("codex/event/agent_reasoning_raw_content", "agent_reasoning_raw_content"),
    ("codex/event/agent_reasoning_raw_content_delta", types::REASONING_RAW_DELTA),
    ("codex/event/exec_command_begin", types::EXEC_BEGIN),
    ("codex/event/exec_command_output_delta", types::EXEC_OUTPUT_DELTA),
    ("codex/event/exec_command_end", types::EXEC_END),
    ("codex/event/exec_approval_request", types::EXEC_APPROVAL_REQUEST),
    ("codex/event/apply_patch_approval_request", types::PATCH_APPROVAL_REQUEST),
    ("codex/event/patch_apply_begin", types::PATCH_APPLY_BEGIN),
    ("codex/event/patch_apply_end", types::PATCH_APPLY_END),
    ("codex/event/mcp_tool_call_begin", types::MCP_TOOL_BEGIN),
    ("codex/event/mcp_tool_call_end", types::MCP_TOOL_END),
    ("codex/event/web_search_begin", types::WEB_SEARCH_BEGIN),
    ("codex/event/web_search_end", types::WEB_SEARCH_END),
    ("codex/event/token_count", types::TOKEN_COUNT),
    ("codex/event/plan_delta", types::PLAN_DELTA),
    ("codex/event/plan_update", types::PLAN_UPDATE),
    ("codex/event/view_image_tool_call", "view_image_tool_call"),
    ("codex/event/get_history_entry_response", "get_history_entry_response"),
    ("codex/event/mcp_list_tools_response", "mcp_list_tools_response"),
    ("codex/event/list_custom_prompts_response", "list_custom_prompts_response"),
    ("codex/event/turn_context", "turn_context"),
    ("codex/event/entered_review_mode", "entered_review_mode"),
    ("codex/event/exited_review_mode", "exited_review_mode"),
    ("codex/event/conversation_path", "conversation_path"),
    ("codex/event/raw_response_item", types::RAW_RESPONSE_ITEM),
    // Two spellings of the dynamic tool call notification are live in the
    // field; both stay until peer versions settle on one.
    ("codex/event/dynamic_tool_call", types::DYNAMIC_TOOL_CALL),
    ("agent/event/dynamic_tool_call", types::DYNAMIC_TOOL_CALL),
    ("agent/event/dynamic_tool_result", "dynamic_tool_result"),
];

/// How a method name resolved against the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodMatch<'a> {
    /// Explicit dictionary entry.
    Explicit(&'static str),
    /// No entry, but a known prefix: wire name passes through.
    Prefix(&'a str),
    /// Neither entry nor prefix: wire name passes through, callers log.
    Unmatched(&'a str),
}

impl<'a> MethodMatch<'a> {
    pub fn event_type(&self) -> &str {
        match self {
            MethodMatch::Explicit(t) => t,
            MethodMatch::Prefix(m) | MethodMatch::Unmatched(m) => m,
        }
    }
}

/// Resolve a wire method name to its internal event type.
pub fn event_type_for_method(method: &str) -> MethodMatch<'_> {
    if let Some((_, event_type)) = METHOD_MAP.iter().find(|(m, _)| *m == method) {
        return MethodMatch::Explicit(event_type);
    }
    if PASSTHROUGH_PREFIXES.iter().any(|p| method.starts_with(p)) {
        return MethodMatch::Prefix(method);
    }
    MethodMatch::Unmatched(method)
}

#[cfg(test)]
#[path = "method_tests.rs"]
mod tests;
