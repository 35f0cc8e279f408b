//! Typed protocol entry points.
//!
//! Every method writes at most one RPC. Version-skew fallbacks (the
//! interrupt ladder, the dynamic-tool-result notification) live here so the
//! session plumbing stays policy-free.

use crate::error::ClientError;
use crate::rollout::{self, RolloutMessage};
use crate::session::{ensure_listener, CodexAgent};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::Ordering;

impl CodexAgent {
    /// `initialize`: advertise the client and opt into the experimental
    /// API surface. Without the opt-in the peer silently drops dynamic
    /// tools. Returns the peer's capabilities opaquely.
    pub async fn initialize(&self) -> Result<Value, ClientError> {
        let params = json!({
            "clientInfo": {
                "name": "cdx",
                "title": "cdx agent orchestrator",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {"experimentalApi": true},
        });
        self.inner.call("initialize", Some(params), self.inner.tunables.call_timeout).await
    }

    /// `thread/start`: open a fresh thread and bind its id to the session.
    pub async fn thread_start(
        &self,
        cwd: Option<&Path>,
        model: Option<&str>,
        instructions: Option<&str>,
        dynamic_tools: &[Value],
    ) -> Result<String, ClientError> {
        let inner = &self.inner;
        let mut params = json!({});
        if let Some(cwd) = cwd {
            params["cwd"] = json!(cwd.to_string_lossy());
        }
        if let Some(model) = model {
            params["model"] = json!(model);
        }
        if let Some(instructions) = instructions {
            params["instructions"] = json!(instructions);
        }
        if !dynamic_tools.is_empty() {
            params["dynamicTools"] = Value::Array(dynamic_tools.to_vec());
        }
        let tool_names: Vec<&str> = dynamic_tools
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .collect();
        tracing::info!(
            agent_id = %inner.agent_id,
            tool_count = tool_names.len(),
            tools = ?tool_names,
            "starting thread"
        );

        let result = inner.call("thread/start", Some(params), inner.tunables.call_timeout).await?;
        let thread_id = result
            .get("thread")
            .and_then(|t| t.get("id"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ClientError::decode("thread/start", "missing thread.id", &result.to_string())
            })?
            .to_string();

        *inner.thread_id.write() = Some(thread_id.clone());
        // A freshly-started thread is already bound to this socket.
        inner.listener_ensure_needed.store(false, Ordering::SeqCst);
        tracing::info!(agent_id = %inner.agent_id, %thread_id, "thread started");
        Ok(thread_id)
    }

    /// `thread/resume`: rebind an existing thread to this session.
    ///
    /// Peers that resume in place return an empty or null result; the
    /// requested id stands in. Peers that fork return the new id.
    pub async fn resume_thread(
        &self,
        thread_id: &str,
        path: Option<&Path>,
        cwd: Option<&Path>,
    ) -> Result<String, ClientError> {
        let inner = &self.inner;
        let mut params = json!({"threadId": thread_id});
        if let Some(path) = path {
            params["path"] = json!(path.to_string_lossy());
        }
        if let Some(cwd) = cwd {
            params["cwd"] = json!(cwd.to_string_lossy());
        }

        let result = inner.call("thread/resume", Some(params), inner.tunables.call_timeout).await?;
        let resolved = result
            .get("thread")
            .and_then(|t| t.get("id"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(thread_id)
            .to_string();

        if resolved == thread_id {
            tracing::info!(agent_id = %inner.agent_id, thread_id, "thread resumed");
        } else {
            tracing::info!(
                agent_id = %inner.agent_id,
                requested = thread_id,
                forked = %resolved,
                "thread forked on resume"
            );
        }

        *inner.thread_id.write() = Some(resolved.clone());
        inner.listener_ensure_needed.store(false, Ordering::SeqCst);
        Ok(resolved)
    }

    /// Start a turn with text, image, and file-mention inputs.
    pub async fn submit(
        &self,
        text: &str,
        images: &[String],
        files: &[String],
        output_schema: Option<Value>,
    ) -> Result<(), ClientError> {
        self.retry_pending_listener_ensure();
        self.inner.submit_turn(text, images, files, output_schema).await
    }

    /// Forward a slash command. `/interrupt` takes the dedicated fallback
    /// ladder; everything else is a `command` notification.
    pub async fn send_command(&self, command: &str, args: &[String]) -> Result<(), ClientError> {
        self.retry_pending_listener_ensure();
        if command == "/interrupt" {
            return self.interrupt().await;
        }
        self.inner
            .notify("command", Some(json!({"command": command, "args": args})))
            .await
    }

    /// Interrupt the active turn, degrading across protocol versions:
    /// turn-scoped, thread-scoped, conversation-scoped, then a plain
    /// command notification.
    async fn interrupt(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let thread_id = inner.thread_id.read().clone().ok_or(ClientError::NoThread)?;
        let deadline = inner.tunables.call_timeout;

        if let Some(turn_id) = inner.turn.active() {
            let params = json!({"threadId": thread_id, "turnId": &*turn_id});
            match inner.call("turn/interrupt", Some(params), deadline).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_turn_mismatch() => {
                    tracing::info!(
                        agent_id = %inner.agent_id,
                        %turn_id,
                        error = %e,
                        "turn-scoped interrupt rejected, retrying thread-scoped"
                    );
                    let params = json!({"threadId": thread_id});
                    match inner.call("turn/interrupt", Some(params), deadline).await {
                        Ok(_) => return Ok(()),
                        Err(e) if e.is_method_unsupported() => {
                            tracing::info!(
                                agent_id = %inner.agent_id,
                                error = %e,
                                "thread-scoped interrupt unsupported, trying conversation scope"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) if e.is_method_unsupported() => {
                    tracing::info!(
                        agent_id = %inner.agent_id,
                        error = %e,
                        "turn/interrupt unsupported, trying conversation scope"
                    );
                }
                Err(e) => return Err(e),
            }
        } else {
            tracing::info!(
                agent_id = %inner.agent_id,
                "no active turn id, interrupting at conversation scope"
            );
        }

        match inner
            .call(
                "interruptConversation",
                Some(json!({"conversationId": thread_id})),
                deadline,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_method_unsupported() => {
                tracing::info!(
                    agent_id = %inner.agent_id,
                    error = %e,
                    "interruptConversation unsupported, sending command notification"
                );
                inner
                    .notify("command", Some(json!({"command": "/interrupt", "args": []})))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Deliver a dynamic tool result.
    ///
    /// With the originating request id this is a JSON-RPC response; without
    /// one (which a well-behaved peer never produces) it degrades to a
    /// notification carrying both id spellings for version tolerance.
    pub async fn send_dynamic_tool_result(
        &self,
        call_id: &str,
        output: &str,
        request_id: Option<i64>,
    ) -> Result<(), ClientError> {
        let inner = &self.inner;
        match request_id {
            Some(id) => {
                let result = json!({
                    "contentItems": [{"type": "inputText", "text": output}],
                    "success": true,
                });
                inner.respond(id, &result).await
            }
            None => {
                tracing::warn!(
                    agent_id = %inner.agent_id,
                    call_id,
                    "dynamic tool result without request id, falling back to notification"
                );
                inner
                    .notify(
                        "dynamic_tool_result",
                        Some(json!({
                            "callId": call_id,
                            "call_id": call_id,
                            "output": output,
                        })),
                    )
                    .await
            }
        }
    }

    /// Reply to a server request with a JSON-RPC error. Required for any
    /// server request the consumer does not otherwise handle.
    pub async fn respond_error(
        &self,
        request_id: i64,
        code: i64,
        message: &str,
    ) -> Result<(), ClientError> {
        self.inner.respond_error(request_id, code, message).await
    }

    /// `thread/list`: opaque passthrough.
    pub async fn list_threads(&self, params: Option<Value>) -> Result<Value, ClientError> {
        self.inner.call("thread/list", params, self.inner.tunables.call_timeout).await
    }

    /// A listener-ensure left pending by a transient failure is retried on
    /// the next outbound operation.
    fn retry_pending_listener_ensure(&self) {
        if self.inner.listener_ensure_needed.load(Ordering::SeqCst)
            && !self.inner.listener_ensure_in_flight.load(Ordering::SeqCst)
        {
            tokio::spawn(ensure_listener(self.inner.clone()));
        }
    }

    /// Reconstruct the bound thread's transcript from its rollout file.
    pub fn transcript(&self) -> Result<Vec<RolloutMessage>, ClientError> {
        let thread_id = self.inner.thread_id.read().clone().ok_or(ClientError::NoThread)?;
        let path = rollout::find_rollout(&thread_id)?;
        rollout::read_rollout(&path)
    }
}
