//! Internal context-retrieval tools.
//!
//! A fixed catalog of exactly five tools the remote model may call
//! mid-conversation for on-demand context. Each tool wraps one collaborator;
//! the dispatcher itself holds no state and caches nothing.
//!
//! # Argument handling
//!
//! Every tool declares a typed argument struct. Raw JSON arguments are
//! deserialized with serde defaults applied, then clamped (the recent-command
//! count is capped at 50) *before* the wrapped collaborator is invoked.
//!
//! # Outcome taxonomy
//!
//! - Nothing found → `success = true` with an explanatory message ("nothing"
//!   is a valid answer).
//! - Backend failure → `success = false` with the error message, scoped to
//!   this tool call.
//! - Unknown tool name → `success = false`, "Unknown internal tool: …".

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::docs::DocsProvider;
use crate::files::FileProvider;
use crate::history::HistorySource;
use crate::search::{merge_session_context, SessionSearch};

/// Hard cap on how many history entries one tool call may request.
pub const RECENT_COMMANDS_CAP: usize = 50;

/// Result of one internal tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub content: Option<String>,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }
}

/// Context bridge handed to every tool execution.
///
/// All collaborators sit behind traits so the dispatcher can be exercised
/// end-to-end with recording stubs.
pub struct ToolContext {
    pub session: Arc<dyn SessionSearch>,
    pub history: Arc<dyn HistorySource>,
    pub files: Arc<dyn FileProvider>,
    pub docs: Arc<dyn DocsProvider>,
}

/// An internal tool the model can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, used as the call name.
    fn name(&self) -> &str;

    /// One-line description for the model's tool list.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with raw JSON parameters. A returned error becomes a
    /// `success = false` outcome scoped to this call.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String>;
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in tools
// ═══════════════════════════════════════════════════════════════════════

/// Search past prompt/response turns with hybrid retrieval.
pub struct SearchSessionHistoryTool;

#[derive(Debug, Deserialize)]
struct SearchSessionHistoryArgs {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: i64,
}

fn default_search_limit() -> i64 {
    5
}

#[async_trait]
impl Tool for SearchSessionHistoryTool {
    fn name(&self) -> &str {
        "search_session_history"
    }

    fn description(&self) -> &str {
        "Search past assistant interactions by topic using hybrid lexical+semantic retrieval"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "limit": { "type": "integer", "description": "Max results", "default": 5 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let args: SearchSessionHistoryArgs = parse_args(params)?;
        let hits = ctx.session.search(&args.query, args.limit).await?;

        if hits.is_empty() {
            return Ok("No relevant past interactions found.".to_string());
        }

        let count = hits.len();
        let entries = merge_session_context(Vec::new(), hits);
        let mut out = format!(
            "Found {} relevant past interaction{}:\n",
            count,
            if count == 1 { "" } else { "s" }
        );
        for entry in entries {
            out.push_str(&format!(
                "\n[{}] User: {}\nAssistant: {}\n",
                format_ts(entry.timestamp),
                entry.prompt,
                snippet(&entry.response, 400)
            ));
        }
        Ok(out)
    }
}

/// Fetch the user's most recent terminal commands.
pub struct GetRecentCommandsTool;

#[derive(Debug, Deserialize)]
struct GetRecentCommandsArgs {
    #[serde(default = "default_recent_commands")]
    count: usize,
}

fn default_recent_commands() -> usize {
    10
}

#[async_trait]
impl Tool for GetRecentCommandsTool {
    fn name(&self) -> &str {
        "get_recent_commands"
    }

    fn description(&self) -> &str {
        "Get the user's most recent terminal commands"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "count": {
                    "type": "integer",
                    "description": "How many commands to fetch (max 50)",
                    "default": 10
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let args: GetRecentCommandsArgs = parse_args(params)?;
        let count = args.count.min(RECENT_COMMANDS_CAP);
        let entries = ctx.history.last_entries(count).await?;

        if entries.is_empty() {
            return Ok("No recent commands found.".to_string());
        }

        let mut out = format!("Recent terminal commands ({}):\n", entries.len());
        for entry in entries {
            out.push_str(&entry.command);
            out.push('\n');
        }
        Ok(out)
    }
}

/// List files in the current project directory.
pub struct ListProjectFilesTool;

#[derive(Debug, Deserialize)]
struct ListProjectFilesArgs {
    #[serde(default = "default_file_limit")]
    limit: usize,
}

fn default_file_limit() -> usize {
    50
}

#[async_trait]
impl Tool for ListProjectFilesTool {
    fn name(&self) -> &str {
        "list_project_files"
    }

    fn description(&self) -> &str {
        "List files in the current project directory"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Max files to list", "default": 50 }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let args: ListProjectFilesArgs = parse_args(params)?;
        let files = ctx.files.list_files(args.limit).await?;

        if files.is_empty() {
            return Ok("No files found.".to_string());
        }

        Ok(format!(
            "Found {} file(s):\n{}",
            files.len(),
            files.join("\n")
        ))
    }
}

/// Read the content of one project file.
pub struct ReadFileContentTool;

#[derive(Debug, Deserialize)]
struct ReadFileContentArgs {
    path: String,
    #[serde(default = "default_max_lines")]
    max_lines: usize,
}

fn default_max_lines() -> usize {
    100
}

#[async_trait]
impl Tool for ReadFileContentTool {
    fn name(&self) -> &str {
        "read_file_content"
    }

    fn description(&self) -> &str {
        "Read the content of a file in the current project"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Relative file path" },
                "max_lines": { "type": "integer", "description": "Line cap", "default": 100 }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let args: ReadFileContentArgs = parse_args(params)?;
        let content = ctx.files.file_content(&args.path, args.max_lines).await;

        // The provider encodes failures as a literal error string; surface
        // them as tool failures, not content.
        if content.starts_with("Error reading file") {
            bail!("{}", content);
        }

        Ok(format!("Content of {}:\n{}", args.path, content))
    }
}

/// Look up documentation for a shell command.
pub struct GetCommandDocsTool;

#[derive(Debug, Deserialize)]
struct GetCommandDocsArgs {
    command: String,
}

#[async_trait]
impl Tool for GetCommandDocsTool {
    fn name(&self) -> &str {
        "get_command_docs"
    }

    fn description(&self) -> &str {
        "Get documentation (man page or tldr) for a shell command"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Command name, e.g. \"grep\"" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String> {
        let args: GetCommandDocsArgs = parse_args(params)?;

        match ctx.docs.lookup(&args.command).await {
            Some(body) => Ok(format!("Documentation for {}:\n{}", args.command, body)),
            None => Ok(format!("No documentation found for '{}'.", args.command)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Fixed registry of internal tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The complete internal catalog, in its fixed order.
    pub fn with_builtins() -> Self {
        Self {
            tools: vec![
                Box::new(SearchSessionHistoryTool),
                Box::new(GetRecentCommandsTool),
                Box::new(ListProjectFilesTool),
                Box::new(ReadFileContentTool),
                Box::new(GetCommandDocsTool),
            ],
        }
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_internal(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function definitions in the wire format the transport sends along.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name(),
                        "description": t.description(),
                        "parameters": t.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    /// Execute a tool by name. Unknown names and execution errors both come
    /// back as failed outcomes; this function never errors.
    pub async fn dispatch(&self, name: &str, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let Some(tool) = self.find(name) else {
            return ToolOutcome::err(format!("Unknown internal tool: {}", name));
        };

        match tool.execute(params, ctx).await {
            Ok(content) => ToolOutcome::ok(content),
            Err(e) => ToolOutcome::err(format!("{:#}", e)),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| anyhow::anyhow!("invalid tool arguments: {}", e))
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::models::{HistoryEntry, InteractionEntry, RetrievalResult, RetrievalSource};

    struct StubSession {
        hits: Vec<RetrievalResult>,
        seen_limits: Mutex<Vec<i64>>,
    }

    impl StubSession {
        fn with_hits(hits: Vec<RetrievalResult>) -> Self {
            Self {
                hits,
                seen_limits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SessionSearch for StubSession {
        async fn search(&self, _query: &str, limit: i64) -> Result<Vec<RetrievalResult>> {
            self.seen_limits.lock().unwrap().push(limit);
            Ok(self.hits.clone())
        }

        async fn recent(&self, _n: i64) -> Result<Vec<InteractionEntry>> {
            Ok(Vec::new())
        }
    }

    struct StubHistory {
        entries: Vec<HistoryEntry>,
        seen_counts: Mutex<Vec<usize>>,
    }

    impl StubHistory {
        fn with_commands(commands: &[&str]) -> Self {
            Self {
                entries: commands
                    .iter()
                    .enumerate()
                    .map(|(i, c)| HistoryEntry {
                        timestamp: 1700000000 + i as i64,
                        duration: 0,
                        command: c.to_string(),
                    })
                    .collect(),
                seen_counts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HistorySource for StubHistory {
        async fn last_entries(&self, n: usize) -> Result<Vec<HistoryEntry>> {
            self.seen_counts.lock().unwrap().push(n);
            Ok(self.entries.clone())
        }
    }

    struct StubFiles {
        listing: Vec<String>,
        content: String,
        seen_limits: Mutex<Vec<usize>>,
        seen_reads: Mutex<Vec<(String, usize)>>,
    }

    impl StubFiles {
        fn new(listing: &[&str], content: &str) -> Self {
            Self {
                listing: listing.iter().map(|s| s.to_string()).collect(),
                content: content.to_string(),
                seen_limits: Mutex::new(Vec::new()),
                seen_reads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FileProvider for StubFiles {
        async fn list_files(&self, limit: usize) -> Result<Vec<String>> {
            self.seen_limits.lock().unwrap().push(limit);
            Ok(self.listing.clone())
        }

        async fn file_content(&self, path: &str, max_lines: usize) -> String {
            self.seen_reads
                .lock()
                .unwrap()
                .push((path.to_string(), max_lines));
            self.content.clone()
        }
    }

    struct StubDocs {
        body: Option<String>,
    }

    #[async_trait]
    impl DocsProvider for StubDocs {
        async fn lookup(&self, _command: &str) -> Option<String> {
            self.body.clone()
        }
    }

    fn hit(id: i64, ts: i64) -> RetrievalResult {
        RetrievalResult {
            entry: InteractionEntry {
                id,
                prompt: "test prompt".to_string(),
                response: "test response".to_string(),
                timestamp: ts,
                cwd: "/test".to_string(),
            },
            score: 0.95,
            source: RetrievalSource::Hybrid,
        }
    }

    fn context_with(
        session: StubSession,
        history: StubHistory,
        files: StubFiles,
        docs: StubDocs,
    ) -> (
        ToolContext,
        Arc<StubSession>,
        Arc<StubHistory>,
        Arc<StubFiles>,
    ) {
        let session = Arc::new(session);
        let history = Arc::new(history);
        let files = Arc::new(files);
        let ctx = ToolContext {
            session: session.clone(),
            history: history.clone(),
            files: files.clone(),
            docs: Arc::new(docs),
        };
        (ctx, session, history, files)
    }

    fn default_context() -> (
        ToolContext,
        Arc<StubSession>,
        Arc<StubHistory>,
        Arc<StubFiles>,
    ) {
        context_with(
            StubSession::with_hits(vec![hit(1, 1700000000)]),
            StubHistory::with_commands(&["ls -la", "cd /test"]),
            StubFiles::new(
                &["src/main.rs", "src/lib.rs", "Cargo.toml"],
                "file content here",
            ),
            StubDocs {
                body: Some("grep - search files for patterns".to_string()),
            },
        )
    }

    #[test]
    fn test_registry_has_exactly_five_tools() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 5);

        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "search_session_history",
                "get_recent_commands",
                "list_project_files",
                "read_file_content",
                "get_command_docs",
            ]
        );
    }

    #[test]
    fn test_is_internal() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.is_internal("get_command_docs"));
        assert!(!registry.is_internal("some_mcp_tool"));
        assert!(!registry.is_internal(""));
    }

    #[test]
    fn test_definitions_are_function_objects() {
        let registry = ToolRegistry::with_builtins();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 5);
        for def in defs {
            assert_eq!(def["type"], "function");
            assert_eq!(def["function"]["parameters"]["type"], "object");
            assert!(def["function"]["name"].is_string());
            assert!(def["function"]["description"].is_string());
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, _) = default_context();

        let outcome = registry.dispatch("not_a_tool", json!({}), &ctx).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Unknown internal tool"));
    }

    #[tokio::test]
    async fn test_search_session_history_found() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, session, _, _) = default_context();

        let outcome = registry
            .dispatch("search_session_history", json!({"query": "test"}), &ctx)
            .await;

        assert!(outcome.success);
        let content = outcome.content.unwrap();
        assert!(content.contains("Found 1 relevant past interaction"));
        assert!(content.contains("test prompt"));
        assert_eq!(*session.seen_limits.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_search_session_history_respects_limit() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, session, _, _) = default_context();

        registry
            .dispatch(
                "search_session_history",
                json!({"query": "test", "limit": 3}),
                &ctx,
            )
            .await;

        assert_eq!(*session.seen_limits.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_search_session_history_empty() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, _) = context_with(
            StubSession::with_hits(Vec::new()),
            StubHistory::with_commands(&[]),
            StubFiles::new(&[], ""),
            StubDocs { body: None },
        );

        let outcome = registry
            .dispatch("search_session_history", json!({"query": "nonexistent"}), &ctx)
            .await;

        assert!(outcome.success);
        assert_eq!(
            outcome.content.as_deref(),
            Some("No relevant past interactions found.")
        );
    }

    #[tokio::test]
    async fn test_search_session_history_presented_chronologically() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, _) = context_with(
            StubSession::with_hits(vec![hit(3, 900), hit(1, 100), hit(2, 500)]),
            StubHistory::with_commands(&[]),
            StubFiles::new(&[], ""),
            StubDocs { body: None },
        );

        let outcome = registry
            .dispatch("search_session_history", json!({"query": "test"}), &ctx)
            .await;

        let content = outcome.content.unwrap();
        assert!(content.contains("Found 3 relevant past interactions"));
        // Oldest timestamp must render before the newest.
        let oldest = content.find(&format_ts(100)).unwrap();
        let newest = content.find(&format_ts(900)).unwrap();
        assert!(oldest < newest);
    }

    #[tokio::test]
    async fn test_get_recent_commands_defaults() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, history, _) = default_context();

        let outcome = registry.dispatch("get_recent_commands", json!({}), &ctx).await;

        assert!(outcome.success);
        let content = outcome.content.unwrap();
        assert!(content.contains("ls -la"));
        assert!(content.contains("cd /test"));
        assert_eq!(*history.seen_counts.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_get_recent_commands_respects_count() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, history, _) = default_context();

        registry
            .dispatch("get_recent_commands", json!({"count": 5}), &ctx)
            .await;

        assert_eq!(*history.seen_counts.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_get_recent_commands_caps_at_fifty() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, history, _) = default_context();

        registry
            .dispatch("get_recent_commands", json!({"count": 100}), &ctx)
            .await;

        assert_eq!(*history.seen_counts.lock().unwrap(), vec![50]);
    }

    #[tokio::test]
    async fn test_list_project_files() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, files) = default_context();

        let outcome = registry.dispatch("list_project_files", json!({}), &ctx).await;

        assert!(outcome.success);
        let content = outcome.content.unwrap();
        assert!(content.contains("Found 3 file(s)"));
        assert!(content.contains("src/main.rs"));
        assert!(content.contains("Cargo.toml"));
        assert_eq!(*files.seen_limits.lock().unwrap(), vec![50]);
    }

    #[tokio::test]
    async fn test_list_project_files_respects_limit() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, files) = default_context();

        registry
            .dispatch("list_project_files", json!({"limit": 10}), &ctx)
            .await;

        assert_eq!(*files.seen_limits.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_read_file_content() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, files) = default_context();

        let outcome = registry
            .dispatch("read_file_content", json!({"path": "src/main.rs"}), &ctx)
            .await;

        assert!(outcome.success);
        assert!(outcome.content.unwrap().contains("file content here"));
        assert_eq!(
            *files.seen_reads.lock().unwrap(),
            vec![("src/main.rs".to_string(), 100)]
        );
    }

    #[tokio::test]
    async fn test_read_file_content_respects_max_lines() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, files) = default_context();

        registry
            .dispatch(
                "read_file_content",
                json!({"path": "src/main.rs", "max_lines": 50}),
                &ctx,
            )
            .await;

        assert_eq!(
            *files.seen_reads.lock().unwrap(),
            vec![("src/main.rs".to_string(), 50)]
        );
    }

    #[tokio::test]
    async fn test_read_file_content_error_string_fails() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, _) = context_with(
            StubSession::with_hits(Vec::new()),
            StubHistory::with_commands(&[]),
            StubFiles::new(&[], "Error reading file nonexistent.rs: No such file or directory"),
            StubDocs { body: None },
        );

        let outcome = registry
            .dispatch("read_file_content", json!({"path": "nonexistent.rs"}), &ctx)
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Error reading file"));
    }

    #[tokio::test]
    async fn test_read_file_content_missing_path_fails() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, _) = default_context();

        let outcome = registry.dispatch("read_file_content", json!({}), &ctx).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid tool arguments"));
    }

    #[tokio::test]
    async fn test_get_command_docs() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, _) = default_context();

        let outcome = registry
            .dispatch("get_command_docs", json!({"command": "grep"}), &ctx)
            .await;

        assert!(outcome.success);
        assert!(outcome.content.unwrap().contains("grep - search files"));
    }

    #[tokio::test]
    async fn test_get_command_docs_missing() {
        let registry = ToolRegistry::with_builtins();
        let (ctx, _, _, _) = context_with(
            StubSession::with_hits(Vec::new()),
            StubHistory::with_commands(&[]),
            StubFiles::new(&[], ""),
            StubDocs { body: None },
        );

        let outcome = registry
            .dispatch("get_command_docs", json!({"command": "nonexistent"}), &ctx)
            .await;

        assert!(outcome.success);
        assert!(outcome.content.unwrap().contains("No documentation found"));
    }
}
