//! Shared spec harness: a scriptable fake app-server over loopback
//! WebSocket plus event-recording helpers.

pub use cdx_client::{AgentClient, ClientError, CodexAgent, ServerCommand, SpawnOptions, Tunables};
pub use cdx_core::{types, AgentEvent};
pub use serde_json::{json, Value};
pub use std::sync::Arc;
pub use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Scripted reply hook: (method, id, params) → frames to send back.
pub type Responder = Arc<dyn Fn(&str, Option<i64>, &Value) -> Vec<String> + Send + Sync>;

/// Fake app-server. Accepts any number of sequential connections (the
/// client reconnects to the same port), records every inbound frame, and
/// answers via the scripted responder.
pub struct FakeServer {
    pub port: u16,
    inbound: mpsc::UnboundedReceiver<Value>,
    latest_conn: Arc<SyncMutex<Option<ConnHandle>>>,
    accept_task: Option<JoinHandle<()>>,
}

struct ConnHandle {
    outbound: mpsc::UnboundedSender<String>,
    kill: mpsc::UnboundedSender<()>,
}

/// Opt-in log output for debugging specs (`RUST_LOG=debug cargo test`).
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

impl FakeServer {
    pub async fn start(responder: Responder) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let latest_conn: Arc<SyncMutex<Option<ConnHandle>>> = Arc::new(SyncMutex::new(None));

        let conns = latest_conn.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let (kill_tx, kill_rx) = mpsc::unbounded_channel();
                *conns.lock() = Some(ConnHandle { outbound: outbound_tx, kill: kill_tx });
                tokio::spawn(serve_conn(
                    stream,
                    responder.clone(),
                    inbound_tx.clone(),
                    outbound_rx,
                    kill_rx,
                ));
            }
        });

        Self { port, inbound, latest_conn, accept_task: Some(accept_task) }
    }

    /// Spawn a supervised `sleep` child, connect, initialize, and start a
    /// thread against this server.
    pub async fn connected_agent(&self) -> CodexAgent {
        let agent = CodexAgent::new(self.port, "spec-agent")
            .with_command(ServerCommand { program: "sleep".into(), args: vec!["300".into()] })
            .with_tunables(fast_tunables());
        agent
            .spawn_and_connect(SpawnOptions {
                cwd: Some(std::env::temp_dir()),
                ..Default::default()
            })
            .await
            .unwrap();
        agent
    }

    /// Inject a frame into the most recent connection.
    pub fn send(&self, frame: Value) {
        let guard = self.latest_conn.lock();
        let conn = guard.as_ref().expect("no live connection");
        conn.outbound.send(frame.to_string()).unwrap();
    }

    /// Hard-close the most recent connection without a close frame.
    pub fn drop_connection(&self) {
        if let Some(conn) = self.latest_conn.lock().as_ref() {
            let _ = conn.kill.send(());
        }
    }

    /// Stop accepting new connections and close the listen socket, so
    /// reconnect attempts are refused.
    pub fn stop_listening(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }

    /// Next recorded inbound frame matching the predicate.
    pub async fn next_frame<F>(&mut self, mut pred: F) -> Value
    where
        F: FnMut(&Value) -> bool,
    {
        let deadline = Duration::from_secs(10);
        tokio::time::timeout(deadline, async {
            loop {
                let frame = self.inbound.recv().await.expect("server inbound closed");
                if pred(&frame) {
                    return frame;
                }
            }
        })
        .await
        .expect("no matching frame before deadline")
    }

    /// Next recorded frame with the given method name.
    pub async fn next_method(&mut self, method: &str) -> Value {
        self.next_frame(|f| f["method"] == method).await
    }
}

async fn serve_conn(
    stream: TcpStream,
    responder: Responder,
    inbound_tx: mpsc::UnboundedSender<Value>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = kill_rx.recv() => break,
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::text(frame)).await.is_err() {
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        let _ = inbound_tx.send(value.clone());
                        if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
                            let id = value.get("id").and_then(|i| i.as_i64());
                            let params = value.get("params").cloned().unwrap_or(Value::Null);
                            for reply in responder(method, id, &params) {
                                if sink.send(Message::text(reply)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Responder that acknowledges everything and hands out fixed thread and
/// turn ids.
pub fn default_responder() -> Responder {
    Arc::new(|method, id, _params| {
        let Some(id) = id else { return Vec::new() };
        let result = match method {
            "thread/start" => json!({"thread": {"id": "th-spec"}}),
            "thread/resume" => json!({"thread": {"id": "th-spec"}}),
            "turn/start" => json!({"turn": {"id": "tu-spec"}}),
            _ => json!({}),
        };
        vec![json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()]
    })
}

/// Tight timings so specs run in seconds.
pub fn fast_tunables() -> Tunables {
    Tunables {
        ready_poll: Duration::from_millis(20),
        ready_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(2),
        read_idle: Duration::from_secs(10),
        ping_interval: Duration::from_millis(250),
        write_deadline: Duration::from_secs(2),
        call_timeout: Duration::from_secs(5),
        reconnect_max_retries: 3,
        reconnect_base: Duration::from_millis(50),
        reconnect_max_delay: Duration::from_millis(200),
        stderr_lines_per_sec: 20,
    }
}

/// Record every event the agent dispatches.
pub fn record_events(agent: &CodexAgent) -> Arc<SyncMutex<Vec<AgentEvent>>> {
    let events = Arc::new(SyncMutex::new(Vec::new()));
    let sink = events.clone();
    agent.set_event_handler(Arc::new(move |ev| sink.lock().push(ev)));
    events
}

/// Wait until the recorded events satisfy the predicate.
pub async fn wait_until<F>(events: &Arc<SyncMutex<Vec<AgentEvent>>>, mut pred: F)
where
    F: FnMut(&[AgentEvent]) -> bool,
{
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            if pred(&events.lock()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached before deadline");
}

/// Wait until the agent's active turn matches.
pub async fn wait_turn(agent: &CodexAgent, expected: Option<&str>) {
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            if agent.active_turn().as_deref() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("active turn did not reach expected state");
}
