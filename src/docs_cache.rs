//! Size-bounded on-disk cache for command documentation.
//!
//! One file per command under the cache root, with a fixed header naming
//! the documentation source:
//!
//! ```text
//! ---
//! source: man|tldr
//! ---
//! <body text>
//! ```
//!
//! The cache key is the command name with every character outside
//! `[A-Za-z0-9_-]` replaced by `_`, plus a `.txt` suffix — lookup is a
//! recomputation, no index. A file's mtime is the sole recency signal:
//! `get` touches it on hit, and the eviction worker deletes oldest-first
//! when the cache grows past its ceiling.
//!
//! Eviction is detached from writes: `set` returns once the file is
//! written and only signals the worker. Total size may transiently exceed
//! the ceiling between a write and the next sweep; sweep errors are
//! swallowed, never surfaced to writers.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

/// Where a cached documentation body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocSource {
    Man,
    Tldr,
}

impl DocSource {
    fn as_str(&self) -> &'static str {
        match self {
            DocSource::Man => "man",
            DocSource::Tldr => "tldr",
        }
    }
}

/// On-disk documentation cache with recency-based eviction.
///
/// An explicit object: the root directory and byte ceiling are injected at
/// construction and the eviction worker lives for the life of the cache.
pub struct DocsCache {
    root: PathBuf,
    max_bytes: u64,
    evict_tx: mpsc::UnboundedSender<()>,
}

impl DocsCache {
    /// Create a cache rooted at `root` with a `max_bytes` ceiling, spawning
    /// its eviction worker on the current runtime.
    pub fn new(root: PathBuf, max_bytes: u64) -> Self {
        let (evict_tx, mut evict_rx) = mpsc::unbounded_channel::<()>();

        let worker_root = root.clone();
        tokio::spawn(async move {
            while evict_rx.recv().await.is_some() {
                if let Err(e) = sweep(&worker_root, max_bytes) {
                    tracing::debug!("docs cache eviction skipped: {:#}", e);
                }
            }
        });

        Self {
            root,
            max_bytes,
            evict_tx,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn cache_path(&self, command: &str) -> PathBuf {
        self.root.join(format!("{}.txt", sanitize_key(command)))
    }

    /// Read cached documentation for a command.
    ///
    /// A malformed file is deleted and reported as absent (self-heal).
    /// A hit updates the file's mtime so eviction sees it as fresh.
    pub fn get(&self, command: &str) -> Option<String> {
        let path = self.cache_path(command);
        let content = std::fs::read_to_string(&path).ok()?;

        let Some(body) = parse_cache_file(&content) else {
            tracing::debug!("removing malformed docs cache file {}", path.display());
            let _ = std::fs::remove_file(&path);
            return None;
        };
        let body = body.to_string();

        // Touch mtime; failing to is harmless (the entry just ages faster).
        if let Ok(file) = std::fs::File::options().append(true).open(&path) {
            let _ = file.set_modified(SystemTime::now());
        }

        Some(body)
    }

    /// Cache documentation for a command, overwriting any previous entry,
    /// then signal the eviction worker. Returns once the write is durable —
    /// not once eviction settles.
    pub fn set(&self, command: &str, body: &str, source: DocSource) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create docs cache dir: {}", self.root.display()))?;

        let path = self.cache_path(command);
        let content = format!("---\nsource: {}\n---\n{}", source.as_str(), body);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write docs cache file: {}", path.display()))?;

        // Worker gone means process shutdown; nothing to clean up then.
        let _ = self.evict_tx.send(());
        Ok(())
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_key(command: &str) -> String {
    command
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Validate the header and return the body, or `None` when malformed.
fn parse_cache_file(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---\nsource: ")?;
    let (source, body) = rest.split_once("\n---\n")?;
    match source {
        "man" | "tldr" => Some(body),
        _ => None,
    }
}

/// Delete oldest-by-mtime cache files until total size is within `max_bytes`.
///
/// Best-effort: files vanishing mid-sweep are skipped, and callers are
/// expected to discard the error.
pub fn sweep(root: &Path, max_bytes: u64) -> Result<()> {
    let entries = std::fs::read_dir(root)?;

    let mut files: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
    let mut total: u64 = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        total += meta.len();
        files.push((path, meta.len(), mtime));
    }

    if total <= max_bytes {
        return Ok(());
    }

    files.sort_by_key(|(_, _, mtime)| *mtime);

    for (path, size, _) in files {
        if total <= max_bytes {
            break;
        }
        if std::fs::remove_file(&path).is_ok() {
            total = total.saturating_sub(size);
        }
    }

    Ok(())
}
