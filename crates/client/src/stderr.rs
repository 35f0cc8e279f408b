//! Stderr diagnostics collector for the spawned server.
//!
//! Tags every line with the agent id and rate-limits to a per-second budget
//! so a crash-looping server cannot flood the log.

use cdx_core::AgentId;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::task::JoinHandle;

pub(crate) struct StderrCollector {
    handle: JoinHandle<()>,
}

impl StderrCollector {
    pub(crate) fn start(agent_id: AgentId, stderr: ChildStderr, lines_per_sec: u32) -> Self {
        let handle = tokio::spawn(collect(agent_id, stderr, lines_per_sec));
        Self { handle }
    }

    /// Stop the collector. Only called after the child has been reaped (or
    /// the reap abandoned): the scanner blocks on a pipe only the OS
    /// unblocks once the child is gone.
    pub(crate) fn stop(self) {
        self.handle.abort();
    }
}

async fn collect(agent_id: AgentId, stderr: ChildStderr, lines_per_sec: u32) {
    let mut lines = BufReader::new(stderr).lines();
    let mut window_start = Instant::now();
    let mut in_window: u32 = 0;
    let mut suppressed: u64 = 0;

    while let Ok(Some(line)) = lines.next_line().await {
        if window_start.elapsed() >= Duration::from_secs(1) {
            if suppressed > 0 {
                tracing::warn!(%agent_id, suppressed, "server stderr lines suppressed");
            }
            window_start = Instant::now();
            in_window = 0;
            suppressed = 0;
        }
        in_window += 1;
        if in_window <= lines_per_sec {
            tracing::warn!(%agent_id, line = %line, "server stderr");
        } else {
            suppressed += 1;
        }
    }
    if suppressed > 0 {
        tracing::warn!(%agent_id, suppressed, "server stderr lines suppressed");
    }
    tracing::debug!(%agent_id, "server stderr stream ended");
}
