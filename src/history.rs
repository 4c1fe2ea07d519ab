//! Terminal history source.
//!
//! Reads the user's shell history file and exposes the newest entries.
//! Supports both zsh extended history (`: <timestamp>:<duration>;<command>`)
//! and plain one-command-per-line files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::HistoryEntry;

/// A source of recent terminal commands.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// The last `n` history entries, oldest first.
    async fn last_entries(&self, n: usize) -> Result<Vec<HistoryEntry>>;
}

/// History source backed by a zsh history file.
pub struct ZshHistory {
    path: PathBuf,
}

impl ZshHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl HistorySource for ZshHistory {
    async fn last_entries(&self, n: usize) -> Result<Vec<HistoryEntry>> {
        let content = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read history file: {}", self.path.display()))?;
        // zsh history is not guaranteed valid UTF-8 (metafied bytes).
        let content = String::from_utf8_lossy(&content);

        let mut entries: Vec<HistoryEntry> = content
            .lines()
            .filter_map(parse_history_line)
            .collect();

        if entries.len() > n {
            entries.drain(..entries.len() - n);
        }
        Ok(entries)
    }
}

/// Parse one history line in either extended or plain format.
fn parse_history_line(line: &str) -> Option<HistoryEntry> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }

    // Extended format: ": 1699999999:0;git status"
    if let Some(rest) = line.strip_prefix(": ") {
        let (meta, command) = rest.split_once(';')?;
        let (ts, dur) = meta.split_once(':')?;
        let command = command.trim();
        if command.is_empty() {
            return None;
        }
        return Some(HistoryEntry {
            timestamp: ts.trim().parse().unwrap_or(0),
            duration: dur.trim().parse().unwrap_or(0),
            command: command.to_string(),
        });
    }

    Some(HistoryEntry {
        timestamp: 0,
        duration: 0,
        command: line.to_string(),
    })
}
