//! Session and tool-call logs
//!
//! `session_log.json` holds one JSON object per line
//! (`{"timestamp", "action", "details"}`) and is what `--stream-log` tails.
//! `tool_calls.log` is a plain-text audit of tool invocations.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

const PARAM_PREVIEW_CHARS: usize = 50;

/// One line of the session log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Unix time with fractional seconds
    pub timestamp: f64,
    pub action: String,
    pub details: String,
}

impl LogEntry {
    pub fn new(action: &str, details: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            timestamp: now.timestamp_millis() as f64 / 1000.0,
            action: action.to_string(),
            details: details.to_string(),
        }
    }

    /// `<timestamp> - <action>: <details>`
    pub fn render(&self) -> String {
        format!("{} - {}: {}", self.timestamp, self.action, self.details)
    }
}

#[derive(Debug, Clone)]
pub struct SessionLog {
    session_path: PathBuf,
    tool_path: PathBuf,
}

impl SessionLog {
    pub fn new(session_path: impl Into<PathBuf>, tool_path: impl Into<PathBuf>) -> Self {
        Self {
            session_path: session_path.into(),
            tool_path: tool_path.into(),
        }
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Append an action to the session log. Failures are logged, not returned.
    pub async fn log_action(&self, action: &str, details: &str) {
        let entry = LogEntry::new(action, details);
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode session log entry: {}", e);
                return;
            }
        };
        if let Err(e) = append_line(&self.session_path, &line).await {
            warn!("Failed to write session log {}: {}", self.session_path.display(), e);
        }
    }

    /// Append a tool call to the tool log, truncating long string arguments
    pub async fn log_tool_call(&self, tool: &str, params: &Value) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!(
            "{} - Tool: {}, Parameters: {}",
            timestamp,
            tool,
            truncate_params(params)
        );
        if let Err(e) = append_line(&self.tool_path, &line).await {
            warn!("Failed to write tool log {}: {}", self.tool_path.display(), e);
        }
    }
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}

fn truncate_params(params: &Value) -> Value {
    match params {
        Value::String(s) if s.chars().count() > PARAM_PREVIEW_CHARS => {
            Value::String(format!("{}...", s.chars().take(PARAM_PREVIEW_CHARS).collect::<String>()))
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate_params(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Tail the session log forever, printing each entry as it appears
pub async fn stream_log(path: &Path) -> Result<()> {
    if !path.exists() {
        println!("No active Goose session log found.");
        return Ok(());
    }

    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            continue;
        }
        match serde_json::from_str::<LogEntry>(line.trim()) {
            Ok(entry) => println!("{}", entry.render()),
            Err(_) => println!("Error decoding log entry: {}", line.trim_end()),
        }
    }
}
