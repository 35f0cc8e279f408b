//! WebSocket connection slot.
//!
//! One live connection per session. The write half lives behind a single
//! async mutex so frames never interleave; every write carries a bounded
//! deadline, and a failed write clears the slot. The generation counter
//! ties each pinger to the connection it was started for, so a pinger left
//! over from before a reconnect exits instead of pinging the new socket.

use crate::error::ClientError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub(crate) type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
pub(crate) type WsSource = SplitStream<WebSocketStream<TcpStream>>;

pub(crate) struct ConnSlot {
    writer: tokio::sync::Mutex<Option<WsSink>>,
    generation: AtomicU64,
}

impl ConnSlot {
    pub(crate) fn new() -> Self {
        Self { writer: tokio::sync::Mutex::new(None), generation: AtomicU64::new(0) }
    }

    /// Dial the loopback server and complete the WebSocket handshake, both
    /// under the handshake deadline.
    pub(crate) async fn dial(
        port: u16,
        handshake_timeout: Duration,
    ) -> Result<(WsSink, WsSource), ClientError> {
        let addr = format!("127.0.0.1:{port}");
        let url = format!("ws://{addr}");

        let stream = tokio::time::timeout(handshake_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::transport("dial", "tcp connect deadline exceeded"))?
            .map_err(|e| ClientError::transport("dial", e))?;

        let (ws, _resp) =
            tokio::time::timeout(handshake_timeout, tokio_tungstenite::client_async(url.as_str(), stream))
                .await
                .map_err(|_| ClientError::transport("dial", "handshake deadline exceeded"))?
                .map_err(|e| ClientError::transport("dial", e))?;

        Ok(ws.split())
    }

    /// Install a fresh connection, bumping the generation.
    pub(crate) async fn install(&self, sink: WsSink) -> u64 {
        *self.writer.lock().await = Some(sink);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) async fn clear(&self) {
        *self.writer.lock().await = None;
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Serialized write with a bounded deadline. Failure clears the slot.
    pub(crate) async fn send(
        &self,
        msg: Message,
        deadline: Duration,
        op: &str,
    ) -> Result<(), ClientError> {
        let mut guard = self.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(ClientError::transport(op, "not connected"));
        };
        match tokio::time::timeout(deadline, sink.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                *guard = None;
                Err(ClientError::transport(op, e))
            }
            Err(_) => {
                *guard = None;
                Err(ClientError::transport(op, "write deadline exceeded"))
            }
        }
    }

    pub(crate) async fn send_text(
        &self,
        text: String,
        deadline: Duration,
        op: &str,
    ) -> Result<(), ClientError> {
        self.send(Message::text(text), deadline, op).await
    }

    pub(crate) async fn send_ping(&self, deadline: Duration) -> Result<(), ClientError> {
        self.send(Message::Ping(Default::default()), deadline, "ping").await
    }

    /// Best-effort close frame with a short deadline.
    pub(crate) async fn send_close(&self, deadline: Duration) {
        let _ = self.send(Message::Close(None), deadline, "close").await;
    }
}
