//! Command documentation lookup: cache first, then `man`, then `tldr`.
//!
//! Fetched bodies are written back to the [`DocsCache`] so repeat lookups
//! stay local. Absence (no man page, no tldr page, neither tool installed)
//! is not an error — callers receive `None`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::docs_cache::{DocSource, DocsCache};

/// Longest documentation body kept, in lines. Man pages routinely run to
/// thousands of lines; the tail adds little for prompt context.
const MAX_DOC_LINES: usize = 400;

/// Source of command documentation text.
#[async_trait]
pub trait DocsProvider: Send + Sync {
    /// Documentation for `command`, or `None` when none can be found.
    async fn lookup(&self, command: &str) -> Option<String>;
}

/// Cache-backed documentation provider shelling out to `man` and `tldr`.
pub struct CommandDocs {
    cache: Arc<DocsCache>,
}

impl CommandDocs {
    pub fn new(cache: Arc<DocsCache>) -> Self {
        Self { cache }
    }

    async fn fetch_man(command: &str) -> Option<String> {
        let output = Command::new("man")
            .arg(command)
            .env("MANPAGER", "cat")
            .env("PAGER", "cat")
            .env("MANWIDTH", "80")
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        let text = strip_overstrike(&String::from_utf8_lossy(&output.stdout));
        non_empty(truncate_lines(&text, MAX_DOC_LINES))
    }

    async fn fetch_tldr(command: &str) -> Option<String> {
        let output = Command::new("tldr").arg(command).output().await.ok()?;

        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout).to_string();
        non_empty(truncate_lines(&text, MAX_DOC_LINES))
    }
}

#[async_trait]
impl DocsProvider for CommandDocs {
    async fn lookup(&self, command: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(command) {
            return Some(cached);
        }

        if let Some(body) = Self::fetch_man(command).await {
            if let Err(e) = self.cache.set(command, &body, DocSource::Man) {
                tracing::debug!("failed to cache man page for {}: {:#}", command, e);
            }
            return Some(body);
        }

        if let Some(body) = Self::fetch_tldr(command).await {
            if let Err(e) = self.cache.set(command, &body, DocSource::Tldr) {
                tracing::debug!("failed to cache tldr page for {}: {:#}", command, e);
            }
            return Some(body);
        }

        None
    }
}

/// Remove nroff overstrike sequences (`X\bX` bolding, `_\bX` underlining)
/// that `man | cat` leaves in the output.
fn strip_overstrike(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\u{8}' {
            out.pop();
        } else {
            out.push(c);
        }
    }
    out
}

fn truncate_lines(text: &str, max_lines: usize) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        lines.push("[truncated]");
    }
    lines.join("\n")
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
