//! Client capability set.
//!
//! Callers hold an [`AgentClient`], not a concrete type. The full JSON-RPC
//! session implements everything; [`RestClient`] is the degraded fallback
//! whose streaming-dependent operations return typed errors instead of
//! pretending to work.

use crate::error::ClientError;
use crate::session::{CodexAgent, SpawnOptions};
use crate::sink::EventHandler;
use async_trait::async_trait;
use serde_json::Value;

/// Capability set every agent client exposes to the orchestrator.
#[async_trait]
pub trait AgentClient: Send + Sync {
    fn set_event_handler(&self, handler: EventHandler);
    async fn spawn_and_connect(&self, opts: SpawnOptions) -> Result<(), ClientError>;
    async fn submit(
        &self,
        text: &str,
        images: &[String],
        files: &[String],
        output_schema: Option<Value>,
    ) -> Result<(), ClientError>;
    async fn send_command(&self, command: &str, args: &[String]) -> Result<(), ClientError>;
    async fn send_dynamic_tool_result(
        &self,
        call_id: &str,
        output: &str,
        request_id: Option<i64>,
    ) -> Result<(), ClientError>;
    async fn respond_error(
        &self,
        request_id: i64,
        code: i64,
        message: &str,
    ) -> Result<(), ClientError>;
    async fn list_threads(&self, params: Option<Value>) -> Result<Value, ClientError>;
    async fn resume_thread(&self, thread_id: &str) -> Result<String, ClientError>;
    async fn shutdown(&self) -> Result<(), ClientError>;
    async fn kill(&self);
    fn running(&self) -> bool;
    fn port(&self) -> u16;
    fn thread_id(&self) -> Option<String>;
}

#[async_trait]
impl AgentClient for CodexAgent {
    fn set_event_handler(&self, handler: EventHandler) {
        CodexAgent::set_event_handler(self, handler);
    }

    async fn spawn_and_connect(&self, opts: SpawnOptions) -> Result<(), ClientError> {
        CodexAgent::spawn_and_connect(self, opts).await
    }

    async fn submit(
        &self,
        text: &str,
        images: &[String],
        files: &[String],
        output_schema: Option<Value>,
    ) -> Result<(), ClientError> {
        CodexAgent::submit(self, text, images, files, output_schema).await
    }

    async fn send_command(&self, command: &str, args: &[String]) -> Result<(), ClientError> {
        CodexAgent::send_command(self, command, args).await
    }

    async fn send_dynamic_tool_result(
        &self,
        call_id: &str,
        output: &str,
        request_id: Option<i64>,
    ) -> Result<(), ClientError> {
        CodexAgent::send_dynamic_tool_result(self, call_id, output, request_id).await
    }

    async fn respond_error(
        &self,
        request_id: i64,
        code: i64,
        message: &str,
    ) -> Result<(), ClientError> {
        CodexAgent::respond_error(self, request_id, code, message).await
    }

    async fn list_threads(&self, params: Option<Value>) -> Result<Value, ClientError> {
        CodexAgent::list_threads(self, params).await
    }

    async fn resume_thread(&self, thread_id: &str) -> Result<String, ClientError> {
        CodexAgent::resume_thread(self, thread_id, None, None).await
    }

    async fn shutdown(&self) -> Result<(), ClientError> {
        CodexAgent::shutdown(self).await
    }

    async fn kill(&self) {
        CodexAgent::kill(self).await;
    }

    fn running(&self) -> bool {
        CodexAgent::running(self)
    }

    fn port(&self) -> u16 {
        CodexAgent::port(self)
    }

    fn thread_id(&self) -> Option<String> {
        CodexAgent::thread_id(self)
    }
}

/// Degraded client for hosts reachable only over the REST gateway.
///
/// No socket, no subprocess, no event stream: operations that need any of
/// those return [`ClientError::Unsupported`] so callers can branch on the
/// capability instead of hanging.
#[derive(Debug, Clone)]
pub struct RestClient {
    port: u16,
}

impl RestClient {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    fn unsupported<T>(op: &str) -> Result<T, ClientError> {
        Err(ClientError::Unsupported { op: op.to_string() })
    }
}

#[async_trait]
impl AgentClient for RestClient {
    fn set_event_handler(&self, _handler: EventHandler) {
        tracing::warn!("rest client has no event stream, handler ignored");
    }

    async fn spawn_and_connect(&self, _opts: SpawnOptions) -> Result<(), ClientError> {
        Self::unsupported("spawn_and_connect")
    }

    async fn submit(
        &self,
        _text: &str,
        _images: &[String],
        _files: &[String],
        _output_schema: Option<Value>,
    ) -> Result<(), ClientError> {
        Self::unsupported("submit")
    }

    async fn send_command(&self, _command: &str, _args: &[String]) -> Result<(), ClientError> {
        Self::unsupported("send_command")
    }

    async fn send_dynamic_tool_result(
        &self,
        _call_id: &str,
        _output: &str,
        _request_id: Option<i64>,
    ) -> Result<(), ClientError> {
        Self::unsupported("send_dynamic_tool_result")
    }

    async fn respond_error(
        &self,
        _request_id: i64,
        _code: i64,
        _message: &str,
    ) -> Result<(), ClientError> {
        Self::unsupported("respond_error")
    }

    async fn list_threads(&self, _params: Option<Value>) -> Result<Value, ClientError> {
        Self::unsupported("list_threads")
    }

    async fn resume_thread(&self, _thread_id: &str) -> Result<String, ClientError> {
        Self::unsupported("resume_thread")
    }

    async fn shutdown(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn kill(&self) {}

    fn running(&self) -> bool {
        false
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn thread_id(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
#[path = "capability_tests.rs"]
mod tests;
