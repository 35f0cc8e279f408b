//! Server subprocess supervision.
//!
//! The server is spawned in its own process group so teardown can signal
//! the whole group at once. Stdin and stdout are discarded; stderr goes to
//! the rate-limited collector. Readiness is a TCP probe against the listen
//! port, not a protocol exchange.

use crate::config::Tunables;
use crate::error::ClientError;
use crate::stderr::StderrCollector;
use cdx_core::AgentId;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Launch recipe for the server binary.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerCommand {
    /// `codex app-server --listen ws://127.0.0.1:<port>`
    pub fn default_for_port(port: u16) -> Self {
        Self {
            program: "codex".to_string(),
            args: vec![
                "app-server".to_string(),
                "--listen".to_string(),
                format!("ws://127.0.0.1:{port}"),
            ],
        }
    }
}

/// A spawned server process and its stderr collector.
pub(crate) struct AppServer {
    child: Child,
    group: Option<i32>,
    stderr: Option<StderrCollector>,
    agent_id: AgentId,
}

impl AppServer {
    /// Spawn the server and block until its port accepts TCP connections.
    ///
    /// The probe runs every `ready_poll` until `ready_timeout` (or the
    /// caller deadline, whichever is sooner). Cancellation kills the child
    /// and reports startup failure.
    pub(crate) async fn spawn(
        agent_id: AgentId,
        port: u16,
        command: &ServerCommand,
        tunables: &Tunables,
        cancel: &CancellationToken,
        caller_deadline: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            ClientError::Startup(format!("failed to spawn {}: {}", command.program, e))
        })?;
        let group = child.id().map(|pid| pid as i32);
        let stderr = child
            .stderr
            .take()
            .map(|s| StderrCollector::start(agent_id.clone(), s, tunables.stderr_lines_per_sec));

        let mut server = Self { child, group, stderr, agent_id: agent_id.clone() };

        let budget = match caller_deadline {
            Some(d) => d.min(tunables.ready_timeout),
            None => tunables.ready_timeout,
        };
        let deadline = Instant::now() + budget;
        let addr = format!("127.0.0.1:{port}");

        loop {
            if cancel.is_cancelled() {
                server.kill_group();
                return Err(ClientError::Startup("cancelled during startup probe".into()));
            }
            if let Ok(Some(status)) = server.child.try_wait() {
                return Err(ClientError::Startup(format!(
                    "server exited during startup: {status}"
                )));
            }
            if let Ok(Ok(_)) =
                tokio::time::timeout(tunables.ready_poll, TcpStream::connect(&addr)).await
            {
                tracing::info!(%agent_id, port, "server port ready");
                return Ok(server);
            }
            if Instant::now() >= deadline {
                server.kill_group();
                return Err(ClientError::Startup(format!(
                    "server not ready on port {port} within {}s",
                    budget.as_secs()
                )));
            }
            tokio::select! {
                _ = tokio::time::sleep(tunables.ready_poll) => {}
                _ = cancel.cancelled() => {
                    server.kill_group();
                    return Err(ClientError::Startup("cancelled during startup probe".into()));
                }
            }
        }
    }

    /// True while the child has not exited.
    pub(crate) fn running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGKILL the whole process group, falling back to the single pid.
    pub(crate) fn kill_group(&mut self) {
        #[cfg(unix)]
        if let Some(group) = self.group {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            if killpg(Pid::from_raw(group), Signal::SIGKILL).is_ok() {
                tracing::debug!(agent_id = %self.agent_id, group, "killed process group");
                return;
            }
        }
        let _ = self.child.start_kill();
    }

    /// Reap the child with a bounded wait, then stop the stderr collector.
    ///
    /// An expired wait is abandoned, not an error: the group was SIGKILLed
    /// and the pipe tasks die with the process.
    pub(crate) async fn reap(mut self, limit: Duration) {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(agent_id = %self.agent_id, %status, "server reaped")
            }
            Ok(Err(e)) => {
                tracing::warn!(agent_id = %self.agent_id, error = %e, "server wait failed")
            }
            Err(_) => tracing::warn!(
                agent_id = %self.agent_id,
                "server wait timed out, abandoning reap"
            ),
        }
        if let Some(collector) = self.stderr.take() {
            collector.stop();
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
