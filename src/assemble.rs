//! Context assembly: one bounded text bundle per query.
//!
//! The assembler pulls from five collaborators in a fixed presentation
//! order — command preferences, terminal history, session history, project
//! files, external catalogs — and renders each as a labeled `##` section.
//! Stages are independently failure-tolerant: a collaborator error is
//! logged and its section omitted, never fatal to the bundle. The four
//! I/O-bound stages are issued concurrently and joined; they share no
//! mutable state.
//!
//! There is no aggregate size ceiling across the bundle; each stage is
//! individually bounded (entry counts, file list limit, inline line cap).

use std::sync::Arc;

use crate::commands::CommandPreferences;
use crate::files::FileProvider;
use crate::history::HistorySource;
use crate::mcp::ToolCatalog;
use crate::search::{merge_session_context, SessionSearch};

/// Per-stage bounds, taken from the config sections that own them.
#[derive(Debug, Clone)]
pub struct AssembleParams {
    /// Terminal-history entries included (stage 2).
    pub recent_commands: usize,
    /// Hybrid hits merged into the session context (stage 3).
    pub session_hits: i64,
    /// Directory listing bound (stage 4).
    pub file_list_limit: usize,
    /// Line cap when inlining a query-mentioned file (stage 4).
    pub inline_max_lines: usize,
}

/// Orchestrates the context collaborators into one prompt bundle.
pub struct ContextAssembler {
    prefs: CommandPreferences,
    history: Arc<dyn HistorySource>,
    session: Arc<dyn SessionSearch>,
    files: Arc<dyn FileProvider>,
    catalog: Arc<dyn ToolCatalog>,
    params: AssembleParams,
}

impl ContextAssembler {
    pub fn new(
        prefs: CommandPreferences,
        history: Arc<dyn HistorySource>,
        session: Arc<dyn SessionSearch>,
        files: Arc<dyn FileProvider>,
        catalog: Arc<dyn ToolCatalog>,
        params: AssembleParams,
    ) -> Self {
        Self {
            prefs,
            history,
            session,
            files,
            catalog,
            params,
        }
    }

    /// Assemble the context bundle for a query. Empty when every stage
    /// comes up empty.
    pub async fn assemble(&self, query: &str) -> String {
        let (history, session, files, tools, resources) = tokio::join!(
            self.history_section(),
            self.session_section(query),
            self.files_section(query),
            self.tools_section(),
            self.resources_section(query),
        );

        let sections = [
            self.prefs.context_section(),
            history,
            session,
            files,
            tools,
            resources,
        ];

        sections
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn history_section(&self) -> Option<String> {
        let entries = match self.history.last_entries(self.params.recent_commands).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("terminal history stage omitted: {:#}", e);
                return None;
            }
        };
        if entries.is_empty() {
            return None;
        }

        let commands: Vec<String> = entries.into_iter().map(|e| e.command).collect();
        Some(format!("## Recent Terminal History\n{}", commands.join("\n")))
    }

    /// Most-recent turn (always, for conversational continuity) merged with
    /// the top hybrid hits for the query, deduped by id, chronological.
    async fn session_section(&self, query: &str) -> Option<String> {
        let recent = match self.session.recent(1).await {
            Ok(recent) => recent,
            Err(e) => {
                tracing::warn!("session history stage omitted: {:#}", e);
                return None;
            }
        };
        let hits = match self.session.search(query, self.params.session_hits).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!("session retrieval failed, keeping recent turn only: {:#}", e);
                Vec::new()
            }
        };

        let merged = merge_session_context(recent, hits);
        if merged.is_empty() {
            return None;
        }

        let mut lines = vec!["## Relevant Session History".to_string()];
        for entry in merged {
            lines.push(format!("User: {}", entry.prompt));
            lines.push(format!("Assistant: {}", entry.response));
        }
        Some(lines.join("\n"))
    }

    async fn files_section(&self, query: &str) -> Option<String> {
        let files = match self.files.list_files(self.params.file_list_limit).await {
            Ok(files) => files,
            Err(e) => {
                tracing::debug!("file listing stage omitted: {:#}", e);
                return None;
            }
        };
        if files.is_empty() {
            return None;
        }

        let mut parts = vec![format!(
            "## Current Directory Files\n{}",
            files.join("\n")
        )];

        // Inline any listed file the query names, by path or bare file name.
        for file in &files {
            let file_name = file.rsplit('/').next().unwrap_or(file);
            if query.contains(file.as_str()) || query.contains(file_name) {
                let content = self
                    .files
                    .file_content(file, self.params.inline_max_lines)
                    .await;
                if content.starts_with("Error reading file") {
                    tracing::debug!("skipping inline of {}: {}", file, content);
                    continue;
                }
                parts.push(format!("## Content of {}\n```\n{}\n```", file, content));
            }
        }

        Some(parts.join("\n\n"))
    }

    async fn tools_section(&self) -> Option<String> {
        let tools = match self.catalog.tools().await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::debug!("external tools stage omitted: {:#}", e);
                return None;
            }
        };
        if tools.is_empty() {
            return None;
        }

        let mut lines = vec![
            "## Available External Tools".to_string(),
            "These tools are available through MCP servers. Mention them if they would be useful:"
                .to_string(),
        ];
        for tool in tools {
            lines.push(format!("- {}: {}", tool.name, tool.description));
        }
        Some(lines.join("\n"))
    }

    async fn resources_section(&self, query: &str) -> Option<String> {
        let resources = match self.catalog.resources(query).await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::debug!("external resources stage omitted: {:#}", e);
                return None;
            }
        };
        if resources.is_empty() {
            return None;
        }

        let mut lines = vec!["## Available External Resources".to_string()];
        for resource in resources {
            lines.push(format!(
                "- {}: {} ({})",
                resource.uri,
                resource.name,
                resource.description.as_deref().unwrap_or("no description")
            ));
        }
        Some(lines.join("\n"))
    }
}
