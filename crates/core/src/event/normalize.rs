//! Payload normalizers applied after method mapping.
//!
//! Older peers nest the interesting fields of an `error` notification one
//! level down and disagree on field casing; some also re-emit v2 streaming
//! deltas in a legacy envelope keyed by conversation id. Both quirks are
//! flattened here so consumers only ever see one shape.

use super::types;
use serde_json::Value;

/// Streaming-delta methods that older peers mirror in a legacy envelope.
/// The envelope shape, not the method name, decides whether a given frame
/// is the mirror or the v2 original.
const STREAMING_DELTA_METHODS: &[&str] = &[
    "codex/event/agent_message_delta",
    "codex/event/agent_message_content_delta",
    "codex/event/agent_reasoning_delta",
    "codex/event/agent_reasoning_raw_content_delta",
    "codex/event/exec_command_output_delta",
    "codex/event/plan_delta",
    "item/agentMessage/delta",
    "item/reasoning/delta",
    "item/reasoning/summaryDelta",
    "item/reasoning/rawContentDelta",
    "item/commandExecution/outputDelta",
];

/// Fields a v2-shaped streaming notification carries and the legacy mirror
/// lacks.
const V2_STREAM_FIELDS: &[&str] =
    &["threadId", "turnId", "itemId", "outputIndex", "contentIndex"];

/// Nested `msg` fields that carry the mirrored payload.
const MIRROR_BODY_FIELDS: &[&str] = &["delta", "text", "content", "output", "message"];

fn get_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// Flatten an `error` notification payload in place and pick its event type.
///
/// Hoists `error.message` / `error.additionalDetails` to top level,
/// synchronizes the `willRetry` / `will_retry` pair, and returns
/// [`types::STREAM_ERROR`] when the error is retryable, [`types::ERROR`]
/// otherwise.
pub fn normalize_error_payload(params: &mut Value) -> &'static str {
    if let Some(nested) = params.get("error").cloned() {
        if nested.is_object() {
            if let Some(message) = get_str(&nested, "message") {
                if params.get("message").is_none() {
                    params["message"] = Value::String(message.to_string());
                }
            }
            if let Some(details) = nested.get("additionalDetails") {
                if params.get("additional_details").is_none() {
                    params["additional_details"] = details.clone();
                }
            }
        }
    }

    let will_retry = params
        .get("willRetry")
        .or_else(|| params.get("will_retry"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if params.get("willRetry").is_some() || params.get("will_retry").is_some() {
        params["willRetry"] = Value::Bool(will_retry);
        params["will_retry"] = Value::Bool(will_retry);
    }

    if will_retry {
        types::STREAM_ERROR
    } else {
        types::ERROR
    }
}

/// True when a `stream_error` payload says the transport will retry.
pub fn is_retryable_stream_error(params: &Value) -> bool {
    params
        .get("willRetry")
        .or_else(|| params.get("will_retry"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Pull a turn id out of a `turn_started` payload.
///
/// Checks top-level `turnId` / `turn_id` / `turn.id`, then recurses one
/// container at a time under `msg` / `data` / `payload` for peers that wrap
/// the interesting part.
pub fn extract_turn_id(params: &Value) -> Option<String> {
    fn non_empty(s: &str) -> Option<String> {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    }

    if let Some(id) = get_str(params, "turnId").and_then(non_empty) {
        return Some(id);
    }
    if let Some(id) = get_str(params, "turn_id").and_then(non_empty) {
        return Some(id);
    }
    if let Some(id) =
        params.get("turn").and_then(|t| get_str(t, "id")).and_then(non_empty)
    {
        return Some(id);
    }
    for key in ["msg", "data", "payload"] {
        if let Some(inner) = params.get(key) {
            if inner.is_object() {
                if let Some(id) = extract_turn_id(inner) {
                    return Some(id);
                }
            }
        }
    }
    None
}

/// Diagnostics retained from a dropped legacy-mirror frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyMirror {
    pub conversation_id: String,
    /// First 80 characters of the mirrored body.
    pub preview: String,
}

/// Detect a legacy-envelope mirror of a v2 streaming delta.
///
/// Mirrors carry `conversationId` plus a nested `msg` body and lack every
/// v2 addressing field. Frames with v2 addressing pass, whatever their
/// method spelling.
pub fn legacy_mirror(method: &str, params: &Value) -> Option<LegacyMirror> {
    if !STREAMING_DELTA_METHODS.contains(&method) {
        return None;
    }
    let conversation_id = get_str(params, "conversationId")?;
    if V2_STREAM_FIELDS.iter().any(|f| params.get(f).is_some()) {
        return None;
    }
    let msg = params.get("msg")?;
    let body = MIRROR_BODY_FIELDS.iter().find_map(|f| msg.get(f))?;
    let text = match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(LegacyMirror {
        conversation_id: conversation_id.to_string(),
        preview: text.chars().take(80).collect(),
    })
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
