//! Append-only record of tool invocations and submitted outputs.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::assistants::runs::{ToolCall, ToolOutput};

/// Appends timestamped entries to a file, when one is configured.
///
/// Write failures are logged and otherwise ignored; the log never fails
/// the operation that writes to it.
#[derive(Debug, Clone, Default)]
pub struct ToolLog {
    path: Option<PathBuf>,
}

impl ToolLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub async fn record_calls(&self, calls: &[ToolCall]) {
        let message = calls
            .iter()
            .map(|call| format!("{} -> {}", call.function.name, call.function.arguments))
            .collect::<Vec<_>>()
            .join("\n");

        self.append(&message).await;
    }

    pub async fn record_outputs(&self, outputs: &[ToolOutput]) {
        let outputs = serde_json::to_string(outputs).unwrap_or_default();
        self.append(&format!("outputs -> {outputs}")).await;
    }

    pub async fn append(&self, message: &str) {
        let Some(path) = &self.path else {
            return;
        };

        if let Err(e) = write_entry(path, &entry(message)).await {
            log::warn!("Failed to write tool log {}: {e}", path.display());
        }
    }
}

fn entry(message: &str) -> String {
    format!("{} - {message}\n", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

async fn write_entry(path: &Path, entry: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    file.write_all(entry.as_bytes()).await?;
    file.flush().await
}
