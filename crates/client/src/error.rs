//! Client error kinds and the RPC-error classifiers the interrupt fallback
//! ladder depends on.

use thiserror::Error;

/// Errors from transport-core operations.
///
/// Every variant names the operation it came from so log lines correlate.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Spawn, port, or readiness-probe failure. Fatal; never retried.
    #[error("startup failed: {0}")]
    Startup(String),

    /// Dial, read, write, or idle-deadline failure on the socket.
    #[error("transport error in {op}: {reason}")]
    Transport { op: String, reason: String },

    /// The peer answered a request with a JSON-RPC error object.
    #[error("rpc error from {op}: code {code}: {message}")]
    Rpc { op: String, code: i64, message: String },

    /// The peer's response did not have the shape the call requires.
    #[error("bad response from {op}: {detail} (raw: {raw_prefix})")]
    Decode { op: String, detail: String, raw_prefix: String },

    /// The per-call deadline elapsed before a response arrived.
    #[error("{op} timed out after {secs}s")]
    Timeout { op: String, secs: u64 },

    /// The session was stopped; no further calls are accepted.
    #[error("session stopped")]
    Stopped,

    /// A thread-scoped operation ran before a thread was bound.
    #[error("no thread bound to this session")]
    NoThread,

    /// This client implementation cannot carry the operation.
    #[error("{op} is not supported by this client")]
    Unsupported { op: String },

    /// No rollout file exists for the thread.
    #[error("no rollout found for thread {0}")]
    NoRollout(String),

    /// A rollout file exists but could not be read.
    #[error("rollout read failed: {0}")]
    RolloutRead(String),
}

/// JSON-RPC "method not found".
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC "invalid params".
pub const CODE_INVALID_PARAMS: i64 = -32602;

impl ClientError {
    pub(crate) fn transport(op: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ClientError::Transport { op: op.into(), reason: reason.to_string() }
    }

    pub(crate) fn decode(op: impl Into<String>, detail: impl Into<String>, raw: &str) -> Self {
        ClientError::Decode {
            op: op.into(),
            detail: detail.into(),
            raw_prefix: cdx_core::short(raw, 120).to_string(),
        }
    }

    /// True when the peer says the method (or its params) does not exist,
    /// the signal to drop down a tier in version-skew fallbacks.
    pub fn is_method_unsupported(&self) -> bool {
        match self {
            ClientError::Rpc { code, message, .. } => {
                if *code == CODE_METHOD_NOT_FOUND || *code == CODE_INVALID_PARAMS {
                    return true;
                }
                let m = message.to_ascii_lowercase();
                m.contains("method not found") || m.contains("invalid params")
            }
            _ => false,
        }
    }

    /// True when the peer rejected a turn-scoped call because the turn id
    /// did not match its view of the active turn.
    pub fn is_turn_mismatch(&self) -> bool {
        match self {
            ClientError::Rpc { message, .. } => {
                let m = message.to_ascii_lowercase();
                m.contains("turn not found")
                    || m.contains("unknown turn")
                    || m.contains("invalid turn")
                    || m.contains("turn id mismatch")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
