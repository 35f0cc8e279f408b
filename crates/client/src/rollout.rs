//! Transcript reconstruction from the peer's on-disk JSONL rollout logs.
//!
//! The peer appends one JSON record per line under
//! `~/.codex/sessions/YYYY/MM/DD/rollout-<stamp>-<threadId>.jsonl`. Only
//! user and assistant messages are kept; system preambles and injected
//! context are filtered out.

use crate::error::ClientError;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One reconstructed transcript message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutMessage {
    pub role: String,
    pub content: String,
    pub timestamp: Option<String>,
}

/// Prefixes of user records that are injected context, not user input.
const INJECTED_PREFIXES: &[&str] =
    &["# AGENTS.md", "<environment_context>", "<INSTRUCTIONS>", "<permissions instructions>"];

/// Everything from this marker onward was appended by the injection layer.
const INJECTION_MARKER: &str = "已注入";

fn get_str<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(|v| v.as_str())
}

/// Read a rollout file and reconstruct the conversation in source order.
///
/// Unparsable lines are skipped; the buffer tolerates lines up to the
/// megabyte range that long assistant turns produce.
pub fn read_rollout(path: &Path) -> Result<Vec<RolloutMessage>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::RolloutRead(format!("{}: {}", path.display(), e)))?;
    let mut reader = BufReader::with_capacity(1 << 20, file);

    let mut messages = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let json: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if let Some(msg) = extract_message(&json) {
                    messages.push(msg);
                }
            }
            Err(e) => {
                return Err(ClientError::RolloutRead(format!("{}: {}", path.display(), e)))
            }
        }
    }
    Ok(messages)
}

/// Extract a transcript message from one rollout record, if it carries one.
fn extract_message(json: &Value) -> Option<RolloutMessage> {
    if get_str(json, "type") != Some("response_item") {
        return None;
    }
    let payload = json.get("payload")?;
    if get_str(payload, "type") != Some("message") {
        return None;
    }
    let role = get_str(payload, "role")?;
    if role != "user" && role != "assistant" {
        return None;
    }

    let mut content = String::new();
    if let Some(items) = payload.get("content").and_then(|c| c.as_array()) {
        for item in items {
            if let Some(text) = get_str(item, "text") {
                content.push_str(text);
            }
        }
    }

    if role == "user" {
        if INJECTED_PREFIXES.iter().any(|p| content.starts_with(p)) {
            return None;
        }
        if let Some(pos) = content.find(INJECTION_MARKER) {
            content.truncate(pos);
        }
        content = content.trim().to_string();
        if content.is_empty() {
            return None;
        }
    }

    if content.is_empty() {
        return None;
    }

    Some(RolloutMessage {
        role: role.to_string(),
        content,
        timestamp: get_str(json, "timestamp").map(String::from),
    })
}

/// Default sessions root: `$CODEX_HOME/sessions` or `~/.codex/sessions`.
pub fn sessions_root() -> PathBuf {
    if let Ok(home) = std::env::var("CODEX_HOME") {
        return PathBuf::from(home).join("sessions");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".codex").join("sessions")
}

/// Locate the rollout file for a thread under the default sessions root.
pub fn find_rollout(thread_id: &str) -> Result<PathBuf, ClientError> {
    find_rollout_under(&sessions_root(), thread_id)
}

/// Locate the rollout file for a thread.
///
/// Tiers: today's dated directory, then the previous 7 days, then a full
/// recursive sweep. Within a tier the lexicographically greatest filename
/// wins (stamps sort, so that is the newest).
pub fn find_rollout_under(root: &Path, thread_id: &str) -> Result<PathBuf, ClientError> {
    let suffix = format!("-{thread_id}.jsonl");
    let today = Utc::now().date_naive();

    for days_back in 0..=7 {
        let dir = dated_dir(root, today - Duration::days(days_back));
        if let Some(found) = best_match_in(&dir, &suffix) {
            return Ok(found);
        }
    }

    let mut candidates = Vec::new();
    collect_matches(root, &suffix, &mut candidates, 0);
    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    candidates.pop().ok_or_else(|| ClientError::NoRollout(thread_id.to_string()))
}

fn dated_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

fn is_rollout_name(name: &str, suffix: &str) -> bool {
    name.starts_with("rollout-") && name.ends_with(suffix)
}

fn best_match_in(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut best: Option<(String, PathBuf)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_rollout_name(&name, suffix) {
            match &best {
                Some((existing, _)) if *existing >= name => {}
                _ => best = Some((name, entry.path())),
            }
        }
    }
    best.map(|(_, p)| p)
}

fn collect_matches(dir: &Path, suffix: &str, out: &mut Vec<PathBuf>, depth: u32) {
    // Dated layout is three levels deep; one extra level of slack.
    if depth > 4 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_matches(&path, suffix, out, depth + 1);
        } else {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_rollout_name(&name, suffix) {
                out.push(path);
            }
        }
    }
}

#[cfg(test)]
#[path = "rollout_tests.rs"]
mod tests;
