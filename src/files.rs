//! Project file collaborator: bounded listings and content reads.
//!
//! Listings walk the working directory (hidden entries and configured glob
//! patterns excluded), sort for deterministic ordering, and truncate to the
//! caller's limit. Content reads never fail at the type level — per the
//! collaborator contract, failures come back as the literal string
//! `Error reading file {path}: {cause}` so they can flow into prompt text
//! and still be detected by the tool dispatcher.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::FilesConfig;

/// A source of project file listings and contents.
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Relative paths of up to `limit` files, sorted.
    async fn list_files(&self, limit: usize) -> Result<Vec<String>>;

    /// Up to `max_lines` lines of `path`, or a literal
    /// `Error reading file …` string.
    async fn file_content(&self, path: &str, max_lines: usize) -> String;
}

/// Walkdir-backed file provider rooted at the query's working directory.
pub struct WorkspaceFiles {
    root: PathBuf,
    excludes: GlobSet,
}

impl WorkspaceFiles {
    pub fn new(root: PathBuf, config: &FilesConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude_globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            root,
            excludes: builder.build()?,
        })
    }
}

#[async_trait]
impl FileProvider for WorkspaceFiles {
    async fn list_files(&self, limit: usize) -> Result<Vec<String>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if self.excludes.is_match(&rel_str) {
                continue;
            }

            files.push(rel_str);
        }

        // Sort for deterministic ordering
        files.sort();
        files.truncate(limit);
        Ok(files)
    }

    async fn file_content(&self, path: &str, max_lines: usize) -> String {
        let full = self.root.join(path);
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => {
                let mut lines: Vec<&str> = content.lines().collect();
                if lines.len() > max_lines {
                    lines.truncate(max_lines);
                    lines.push("[truncated]");
                }
                lines.join("\n")
            }
            Err(e) => format!("Error reading file {}: {}", path, e),
        }
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}
