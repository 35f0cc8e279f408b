//! JSON-RPC 2.0 framing and pending-call correlation.
//!
//! Ids are allocated from one monotonic counter per session. Each outbound
//! request parks a oneshot waiter; the read loop resolves it from the
//! matching response. Waiters resolve exactly once: response, per-call
//! timeout, session cancellation, or the fail-all sweep on transport loss.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::oneshot;

/// Why a parked call resolved without a result.
#[derive(Debug, Clone)]
pub(crate) enum CallFailure {
    /// Peer replied with a JSON-RPC error object.
    Rpc { code: i64, message: String },
    /// The connection died while the call was in flight.
    Transport(String),
}

pub(crate) type CallResult = Result<Value, CallFailure>;

/// Pending-call table: id allocation plus waiter parking.
pub(crate) struct PendingCalls {
    next_id: AtomicI64,
    waiters: Mutex<HashMap<i64, oneshot::Sender<CallResult>>>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self { next_id: AtomicI64::new(1), waiters: Mutex::new(HashMap::new()) }
    }

    /// Allocate the next id and park a waiter for it.
    pub(crate) fn register(&self) -> (i64, oneshot::Receiver<CallResult>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);
        (id, rx)
    }

    /// Route a result to the waiter for `id`. Returns false for orphans.
    pub(crate) fn resolve(&self, id: i64, result: CallResult) -> bool {
        match self.waiters.lock().remove(&id) {
            // A dropped receiver means the caller already timed out; the
            // send result is irrelevant either way.
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Remove a waiter without resolving it (timeout / cancellation path).
    pub(crate) fn discard(&self, id: i64) {
        self.waiters.lock().remove(&id);
    }

    /// Fail every in-flight call with a transport error. Returns the count.
    pub(crate) fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut waiters = self.waiters.lock();
            waiters.drain().collect()
        };
        let n = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(CallFailure::Transport(reason.to_string())));
        }
        n
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.waiters.lock().len()
    }
}

pub(crate) fn request_frame(id: i64, method: &str, params: Option<&Value>) -> String {
    match params {
        Some(p) => json!({"jsonrpc": "2.0", "id": id, "method": method, "params": p}),
        None => json!({"jsonrpc": "2.0", "id": id, "method": method}),
    }
    .to_string()
}

pub(crate) fn notification_frame(method: &str, params: Option<&Value>) -> String {
    match params {
        Some(p) => json!({"jsonrpc": "2.0", "method": method, "params": p}),
        None => json!({"jsonrpc": "2.0", "method": method}),
    }
    .to_string()
}

pub(crate) fn response_frame(id: i64, result: &Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

pub(crate) fn error_frame(id: i64, code: i64, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

/// One parsed inbound frame. Classification: id without method is a
/// response; a method (with or without id) is an event.
#[derive(Debug, Deserialize)]
pub(crate) struct InboundFrame {
    pub id: Option<i64>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    pub result: Option<Value>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl InboundFrame {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub(crate) fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }

    pub(crate) fn into_call_result(self) -> CallResult {
        match self.error {
            Some(e) => Err(CallFailure::Rpc { code: e.code, message: e.message }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
