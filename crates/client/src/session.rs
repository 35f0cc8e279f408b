//! Agent session: subprocess + WebSocket + read loop + reconnect.
//!
//! One [`CodexAgent`] per agent. The session owns three long-lived tasks:
//! the read loop (frame classification and event dispatch, strictly in
//! network-receive order), the pinger, and the stderr collector. Protocol
//! entry points live in `facade.rs`; this module is lifecycle and plumbing.

use crate::config::Tunables;
use crate::error::ClientError;
use crate::inputs::build_inputs;
use crate::mapper::{EventMapper, Mapped};
use crate::process::{AppServer, ServerCommand};
use crate::rpc::{self, CallFailure, InboundFrame, PendingCalls};
use crate::sink::{EventHandler, EventSink};
use crate::turn::TurnTracker;
use crate::ws::{ConnSlot, WsSource};
use cdx_core::{background_payload, extract_turn_id, types, AgentEvent, AgentId, BackgroundStatus};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Options for the spawn-and-connect sequence.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Initial prompt; submitted as the first turn when non-empty.
    pub prompt: String,
    pub cwd: Option<PathBuf>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    /// Opaque dynamic tool declarations forwarded to `thread/start`.
    pub dynamic_tools: Vec<Value>,
    /// Startup deadline; the compiled readiness timeout still caps it.
    pub startup_deadline: Option<Duration>,
}

/// Transport client for one `codex app-server` subprocess.
#[derive(Clone)]
pub struct CodexAgent {
    pub(crate) inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) port: u16,
    pub(crate) agent_id: AgentId,
    pub(crate) command: ServerCommand,
    pub(crate) tunables: Tunables,
    pub(crate) process: parking_lot::Mutex<Option<AppServer>>,
    pub(crate) thread_id: parking_lot::RwLock<Option<String>>,
    pub(crate) turn: TurnTracker,
    pub(crate) mapper: EventMapper,
    pub(crate) sink: EventSink,
    pub(crate) calls: PendingCalls,
    pub(crate) conn: ConnSlot,
    pub(crate) stopped: AtomicBool,
    pub(crate) listener_ensure_needed: AtomicBool,
    pub(crate) listener_ensure_in_flight: AtomicBool,
    pub(crate) cancel: CancellationToken,
    pub(crate) read_done: watch::Sender<bool>,
}

impl CodexAgent {
    pub fn new(port: u16, agent_id: impl Into<AgentId>) -> Self {
        let agent_id = agent_id.into();
        let (read_done, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                port,
                command: ServerCommand::default_for_port(port),
                tunables: Tunables::default(),
                process: parking_lot::Mutex::new(None),
                thread_id: parking_lot::RwLock::new(None),
                turn: TurnTracker::new(agent_id.clone()),
                mapper: EventMapper::new(agent_id.clone()),
                sink: EventSink::new(agent_id.clone()),
                calls: PendingCalls::new(),
                conn: ConnSlot::new(),
                stopped: AtomicBool::new(false),
                listener_ensure_needed: AtomicBool::new(false),
                listener_ensure_in_flight: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                read_done,
                agent_id,
            }),
        }
    }

    /// Override the server launch recipe (simulators, harnesses).
    pub fn with_command(mut self, command: ServerCommand) -> Self {
        let inner = Arc::get_mut(&mut self.inner);
        if let Some(inner) = inner {
            inner.command = command;
        }
        self
    }

    /// Override timing knobs.
    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        let inner = Arc::get_mut(&mut self.inner);
        if let Some(inner) = inner {
            inner.tunables = tunables;
        }
        self
    }

    /// Register the event handler. Replaces any previous handler.
    pub fn set_event_handler(&self, handler: EventHandler) {
        self.inner.sink.set(handler);
    }

    /// Spawn the server, connect, initialize, and bind a fresh thread.
    ///
    /// When `opts.prompt` is non-empty it is submitted as the first turn.
    /// Any failure tears the session down; startup errors are never
    /// retried.
    pub async fn spawn_and_connect(&self, opts: SpawnOptions) -> Result<(), ClientError> {
        let inner = &self.inner;
        let span = tracing::info_span!(
            "agent.spawn",
            agent_id = %inner.agent_id,
            port = inner.port
        );
        let result = async {
            inner.ensure_live()?;

            let server = AppServer::spawn(
                inner.agent_id.clone(),
                inner.port,
                &inner.command,
                &inner.tunables,
                &inner.cancel,
                opts.startup_deadline,
            )
            .await?;
            *inner.process.lock() = Some(server);

            let (sink, source) =
                ConnSlot::dial(inner.port, inner.tunables.handshake_timeout).await?;
            let generation = inner.conn.install(sink).await;
            tokio::spawn(read_loop(inner.clone(), source));
            spawn_pinger(inner.clone(), generation);

            self.initialize().await?;
            self.thread_start(
                opts.cwd.as_deref(),
                opts.model.as_deref(),
                opts.instructions.as_deref(),
                &opts.dynamic_tools,
            )
            .await?;

            if !opts.prompt.is_empty() {
                self.inner.submit_turn(&opts.prompt, &[], &[], None).await?;
            }
            Ok(())
        }
        .instrument(span)
        .await;

        if let Err(ref e) = result {
            tracing::error!(agent_id = %inner.agent_id, error = %e, "spawn failed, tearing down");
            inner.teardown("spawn failed").await;
        }
        result
    }

    /// Graceful teardown. Idempotent; total wall time is bounded by the
    /// read-loop and reap budgets even when the child refuses to die.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(agent_id = %inner.agent_id, "shutting down agent session");
        inner.cancel.cancel();

        // Best-effort: the socket may already be gone.
        let _ = inner
            .conn
            .send_text(
                rpc::notification_frame("shutdown", None),
                Duration::from_secs(1),
                "shutdown",
            )
            .await;
        inner.conn.send_close(Duration::from_secs(1)).await;
        inner.conn.clear().await;

        let mut done = inner.read_done.subscribe();
        let _ = tokio::time::timeout(Duration::from_secs(3), done.wait_for(|d| *d)).await;

        let server = inner.process.lock().take();
        if let Some(mut server) = server {
            server.kill_group();
            server.reap(Duration::from_secs(5)).await;
        }
        inner.calls.fail_all("session stopped");
        Ok(())
    }

    /// Immediate teardown: no shutdown notification, no grace.
    pub async fn kill(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.teardown("killed").await;
    }

    /// True while the server subprocess is alive.
    pub fn running(&self) -> bool {
        self.inner.process_running()
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.inner.agent_id
    }

    pub fn thread_id(&self) -> Option<String> {
        self.inner.thread_id.read().clone()
    }

    /// Id of the currently-executing turn, if any.
    pub fn active_turn(&self) -> Option<String> {
        self.inner.turn.active().map(|t| t.to_string())
    }
}

impl SessionInner {
    pub(crate) fn ensure_live(&self) -> Result<(), ClientError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ClientError::Stopped);
        }
        Ok(())
    }

    pub(crate) fn process_running(&self) -> bool {
        match self.process.lock().as_mut() {
            Some(server) => server.running(),
            None => false,
        }
    }

    /// Write one frame; a failed write sweeps every pending call.
    pub(crate) async fn send_frame(&self, text: String, op: &str) -> Result<(), ClientError> {
        match self.conn.send_text(text, self.tunables.write_deadline, op).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let swept = self.calls.fail_all(&format!("write failed: {e}"));
                if swept > 0 {
                    tracing::warn!(
                        agent_id = %self.agent_id,
                        swept,
                        "failed pending calls after write error"
                    );
                }
                Err(e)
            }
        }
    }

    /// Issue a request and wait for its response, the per-call deadline, or
    /// session cancellation, whichever comes first.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, ClientError> {
        self.ensure_live()?;
        let (id, rx) = self.calls.register();
        let frame = rpc::request_frame(id, method, params.as_ref());
        if let Err(e) = self.send_frame(frame, method).await {
            self.calls.discard(id);
            return Err(e);
        }
        tokio::select! {
            res = rx => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(CallFailure::Rpc { code, message })) => {
                    Err(ClientError::Rpc { op: method.to_string(), code, message })
                }
                Ok(Err(CallFailure::Transport(reason))) => {
                    Err(ClientError::transport(method, reason))
                }
                Err(_) => Err(ClientError::transport(method, "waiter dropped")),
            },
            _ = tokio::time::sleep(deadline) => {
                self.calls.discard(id);
                Err(ClientError::Timeout { op: method.to_string(), secs: deadline.as_secs() })
            }
            _ = self.cancel.cancelled() => {
                self.calls.discard(id);
                Err(ClientError::Stopped)
            }
        }
    }

    pub(crate) async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.send_frame(rpc::notification_frame(method, params.as_ref()), method).await
    }

    /// Reply to a server request with a result.
    pub(crate) async fn respond(&self, id: i64, result: &Value) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.send_frame(rpc::response_frame(id, result), "respond").await
    }

    /// Reply to a server request with a JSON-RPC error.
    pub(crate) async fn respond_error(
        &self,
        id: i64,
        code: i64,
        message: &str,
    ) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.send_frame(rpc::error_frame(id, code, message), "respond_error").await
    }

    /// Start a turn on the bound thread, harvesting the turn id from the
    /// response when no `turn_started` notification preceded it.
    pub(crate) async fn submit_turn(
        &self,
        text: &str,
        images: &[String],
        files: &[String],
        output_schema: Option<Value>,
    ) -> Result<(), ClientError> {
        let thread_id = self.thread_id.read().clone().ok_or(ClientError::NoThread)?;
        let items = build_inputs(text, images, files);
        let mut params = json!({"threadId": thread_id, "input": items});
        if let Some(schema) = output_schema {
            params["outputSchema"] = schema;
        }
        let result = self.call("turn/start", Some(params), self.tunables.call_timeout).await?;
        if self.turn.active().is_none() {
            if let Some(turn_id) = extract_turn_id(&result) {
                tracing::debug!(
                    agent_id = %self.agent_id,
                    %turn_id,
                    "turn id harvested from turn/start response"
                );
                self.turn.set(&turn_id);
            }
        }
        Ok(())
    }

    /// Deliver a core-synthesized event through the same path as inbound
    /// frames so turn tracking stays consistent.
    pub(crate) fn emit_synthetic(&self, event_type: &str, params: Value) {
        self.turn.observe(event_type, &params);
        self.sink.dispatch(AgentEvent::notification(event_type, params));
    }

    /// Common teardown for kill and failed spawns.
    pub(crate) async fn teardown(&self, reason: &str) {
        self.cancel.cancel();
        self.conn.clear().await;
        let server = self.process.lock().take();
        if let Some(mut server) = server {
            server.kill_group();
            server.reap(Duration::from_secs(5)).await;
        }
        self.calls.fail_all(reason);
    }
}

/// Keep-alive pinger bound to one connection generation.
pub(crate) fn spawn_pinger(inner: Arc<SessionInner>, generation: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(inner.tunables.ping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // immediate first tick
        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if inner.stopped.load(Ordering::SeqCst) || inner.conn.generation() != generation {
                break;
            }
            if let Err(e) = inner.conn.send_ping(inner.tunables.write_deadline).await {
                tracing::debug!(agent_id = %inner.agent_id, error = %e, "ping failed, pinger exiting");
                inner.calls.fail_all(&format!("ping write failed: {e}"));
                break;
            }
        }
    });
}

/// Read loop: classifies frames, dispatches events in receive order, and
/// arbitrates reconnection on transport loss.
pub(crate) async fn read_loop(inner: Arc<SessionInner>, mut source: WsSource) {
    use tokio_tungstenite::tungstenite::Message;

    loop {
        let next = tokio::select! {
            _ = inner.cancel.cancelled() => break,
            r = tokio::time::timeout(inner.tunables.read_idle, source.next()) => r,
        };
        match next {
            Err(_) => {
                if !handle_loss(&inner, &mut source, "read idle deadline exceeded").await {
                    break;
                }
            }
            Ok(None) => {
                if !handle_loss(&inner, &mut source, "stream ended").await {
                    break;
                }
            }
            Ok(Some(Err(e))) => {
                let reason = e.to_string();
                if !handle_loss(&inner, &mut source, &reason).await {
                    break;
                }
            }
            Ok(Some(Ok(Message::Text(text)))) => handle_text(&inner, text.as_str()),
            Ok(Some(Ok(Message::Close(_)))) => {
                if !handle_loss(&inner, &mut source, "peer closed").await {
                    break;
                }
            }
            // Ping/Pong/Binary: arrival alone refreshes the idle deadline.
            Ok(Some(Ok(_))) => {}
        }
    }

    let _ = inner.read_done.send(true);
    let swept = inner.calls.fail_all("session closed");
    if swept > 0 {
        tracing::debug!(agent_id = %inner.agent_id, swept, "failed pending calls on read-loop exit");
    }
    tracing::debug!(agent_id = %inner.agent_id, "read loop exited");
}

/// Classify and dispatch one text frame.
fn handle_text(inner: &Arc<SessionInner>, text: &str) {
    let Some(frame) = InboundFrame::parse(text) else {
        tracing::warn!(
            agent_id = %inner.agent_id,
            raw = %cdx_core::short(text, 200),
            "unparsable inbound frame, dropping"
        );
        return;
    };

    if frame.is_response() {
        let id = frame.id.unwrap_or_default();
        if !inner.calls.resolve(id, frame.into_call_result()) {
            tracing::warn!(agent_id = %inner.agent_id, id, "orphan response, dropping");
        }
        return;
    }

    let Some(method) = frame.method else {
        tracing::warn!(agent_id = %inner.agent_id, "frame without id or method, dropping");
        return;
    };
    let request_id = frame.id;

    match inner.mapper.map(&method, frame.params) {
        Mapped::DroppedMirror => {}
        Mapped::Event { event_type, params } => {
            inner.turn.observe(&event_type, &params);
            let mut event = AgentEvent::notification(event_type, params);
            if let Some(id) = request_id {
                event.request_id = Some(id);
                event.respond_error = Some(make_respond_error(inner.clone(), id));
                event.deny = Some(make_deny(inner.clone()));
            }
            inner.sink.dispatch(event);
        }
    }
}

fn make_respond_error(inner: Arc<SessionInner>, id: i64) -> cdx_core::RespondErrorFn {
    Arc::new(move |code, message| {
        let inner = inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.respond_error(id, code, &message).await {
                tracing::warn!(agent_id = %inner.agent_id, id, error = %e, "error response failed");
            }
        });
    })
}

fn make_deny(inner: Arc<SessionInner>) -> cdx_core::DenyFn {
    Arc::new(move || {
        let inner = inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.submit_turn("no", &[], &[], None).await {
                tracing::warn!(agent_id = %inner.agent_id, error = %e, "auto-deny turn failed");
            }
        });
    })
}

/// React to transport loss. Returns true when the loop should continue
/// with a fresh connection.
async fn handle_loss(inner: &Arc<SessionInner>, source: &mut WsSource, reason: &str) -> bool {
    if inner.stopped.load(Ordering::SeqCst) || inner.cancel.is_cancelled() {
        return false;
    }
    tracing::warn!(agent_id = %inner.agent_id, reason, "transport lost");
    let swept = inner.calls.fail_all(&format!("transport lost: {reason}"));
    if swept > 0 {
        tracing::warn!(agent_id = %inner.agent_id, swept, "failed pending calls on transport loss");
    }
    inner.conn.clear().await;

    if !inner.process_running() {
        tracing::error!(agent_id = %inner.agent_id, "server process gone, not reconnecting");
        return false;
    }

    match reconnect(inner, reason).await {
        Some(new_source) => {
            *source = new_source;
            true
        }
        None => false,
    }
}

/// Bounded exponential-backoff reconnect, narrated through background
/// events and retryable stream errors.
async fn reconnect(inner: &Arc<SessionInner>, trigger: &str) -> Option<WsSource> {
    let max = inner.tunables.reconnect_max_retries;
    for attempt in 1..=max {
        let delay = inner.tunables.reconnect_delay(attempt);
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = inner.cancel.cancelled() => return None,
            }
        }
        if inner.stopped.load(Ordering::SeqCst) {
            return None;
        }

        inner.emit_synthetic(
            types::BACKGROUND_EVENT,
            background_payload(
                "Reconnecting...",
                BackgroundStatus::Reconnecting,
                "reconnect",
                trigger,
                attempt,
                max,
            ),
        );

        match ConnSlot::dial(inner.port, inner.tunables.handshake_timeout).await {
            Ok((sink, source)) => {
                let generation = inner.conn.install(sink).await;
                tracing::info!(agent_id = %inner.agent_id, attempt, "reconnected");
                inner.emit_synthetic(
                    types::BACKGROUND_EVENT,
                    background_payload(
                        "Reconnected",
                        BackgroundStatus::Completed,
                        "reconnect",
                        trigger,
                        attempt,
                        max,
                    ),
                );
                inner.listener_ensure_needed.store(true, Ordering::SeqCst);
                tokio::spawn(ensure_listener(inner.clone()));
                spawn_pinger(inner.clone(), generation);
                return Some(source);
            }
            Err(e) => {
                let will_retry = attempt < max;
                tracing::warn!(
                    agent_id = %inner.agent_id,
                    attempt,
                    max_retries = max,
                    will_retry,
                    error = %e,
                    "reconnect attempt failed"
                );
                inner.emit_synthetic(
                    types::STREAM_ERROR,
                    json!({
                        "message": format!("Reconnect failed: {e}"),
                        "willRetry": will_retry,
                        "will_retry": will_retry,
                        "phase": "reconnect",
                        "trigger": trigger,
                        "attempt": attempt,
                        "max_retries": max,
                    }),
                );
            }
        }
    }

    inner.emit_synthetic(
        types::BACKGROUND_EVENT,
        background_payload(
            "Reconnect failed",
            BackgroundStatus::Failed,
            "reconnect",
            trigger,
            max,
            max,
        ),
    );
    None
}

/// Post-reconnect thread rebind, single-flight.
///
/// Some peer versions only route thread events to the socket that issued
/// `thread/resume`; a freshly-dialed socket must re-subscribe. Peers that
/// reject the method never need it, so rejection disables the flag for
/// good; transient failures leave it pending for the next attempt.
pub(crate) async fn ensure_listener(inner: Arc<SessionInner>) {
    if !inner.listener_ensure_needed.load(Ordering::SeqCst) {
        return;
    }
    if inner.listener_ensure_in_flight.swap(true, Ordering::SeqCst) {
        return;
    }

    let thread_id = inner.thread_id.read().clone();
    if let Some(thread_id) = thread_id {
        match inner
            .call("thread/resume", Some(json!({"threadId": thread_id})), inner.tunables.call_timeout)
            .await
        {
            Ok(_) => {
                inner.listener_ensure_needed.store(false, Ordering::SeqCst);
                tracing::info!(agent_id = %inner.agent_id, "listener rebound after reconnect");
            }
            Err(e) if e.is_method_unsupported() => {
                inner.listener_ensure_needed.store(false, Ordering::SeqCst);
                tracing::info!(
                    agent_id = %inner.agent_id,
                    error = %e,
                    "peer does not support listener rebind, disabling"
                );
            }
            Err(e) => {
                tracing::warn!(
                    agent_id = %inner.agent_id,
                    error = %e,
                    "listener rebind failed, will retry"
                );
            }
        }
    }

    inner.listener_ensure_in_flight.store(false, Ordering::SeqCst);
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
