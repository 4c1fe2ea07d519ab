//! End-to-end query processing: assemble → complete → tool loop → record.
//!
//! One query runs to completion before the next is accepted. The model may
//! spend a bounded number of turns calling internal tools; every tool result
//! is fed back and generation continues. When the turn budget is exhausted
//! the final request carries no tool definitions, forcing a text answer.
//!
//! Exactly one [`InteractionEntry`](crate::models::InteractionEntry) is
//! written per completed top-level query — tool-call sub-turns are never
//! recorded individually.

use std::sync::Arc;

use anyhow::Result;

use crate::assemble::ContextAssembler;
use crate::config::{Config, EmbeddingConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::{ChatMessage, LlmTransport};
use crate::store::InteractionStore;
use crate::tools::{ToolContext, ToolRegistry};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful CLI assistant. Provide accurate, \
executable shell commands in markdown code blocks. Be concise.";

/// Per-invocation overrides from the CLI.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub model: Option<String>,
    pub system: Option<String>,
    /// Skip context assembly entirely (fast mode).
    pub no_context: bool,
}

/// Owns the collaborators for the lifetime of a session and processes
/// queries one at a time.
pub struct QueryEngine {
    config: Config,
    transport: Arc<dyn LlmTransport>,
    assembler: ContextAssembler,
    registry: ToolRegistry,
    tool_ctx: ToolContext,
    store: Arc<dyn InteractionStore>,
    embedder: Option<Box<dyn EmbeddingProvider>>,
}

impl QueryEngine {
    pub fn new(
        config: Config,
        transport: Arc<dyn LlmTransport>,
        assembler: ContextAssembler,
        registry: ToolRegistry,
        tool_ctx: ToolContext,
        store: Arc<dyn InteractionStore>,
    ) -> Self {
        // Best-effort: a provider that cannot construct just means new
        // entries wait for `sage embed pending`.
        let embedder = if config.embedding.is_enabled() {
            embedding::create_provider(&config.embedding)
                .map_err(|e| tracing::warn!("inline embedding disabled: {:#}", e))
                .ok()
        } else {
            None
        };

        Self {
            config,
            transport,
            assembler,
            registry,
            tool_ctx,
            store,
            embedder,
        }
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Process one query end-to-end and return the final answer text.
    pub async fn run(&self, query: &str, opts: &QueryOptions) -> Result<String> {
        let context = if opts.no_context {
            String::new()
        } else {
            self.assembler.assemble(query).await
        };
        tracing::debug!("assembled context: {} chars", context.len());

        let model = opts.model.as_deref().unwrap_or(&self.config.llm.model);
        let system = opts.system.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let user_content = if context.is_empty() {
            query.to_string()
        } else {
            format!("{}\n\n## User Query\n{}", context, query)
        };

        let mut messages = vec![ChatMessage::system(system), ChatMessage::user(user_content)];
        let tool_defs = self.registry.definitions();

        for _turn in 0..self.config.llm.max_tool_turns {
            let completion = self.transport.complete(model, &messages, &tool_defs).await?;

            if completion.tool_calls.is_empty() {
                let text = completion.text.unwrap_or_default();
                self.record(query, &text).await;
                return Ok(text);
            }

            messages.push(ChatMessage::assistant_tool_calls(
                completion.text.clone(),
                &completion.tool_calls,
            ));

            for call in &completion.tool_calls {
                tracing::debug!("tool call: {} {}", call.name, call.arguments);
                let outcome = self
                    .registry
                    .dispatch(&call.name, call.arguments.clone(), &self.tool_ctx)
                    .await;
                let content = if outcome.success {
                    outcome.content.unwrap_or_default()
                } else {
                    format!(
                        "Error: {}",
                        outcome.error.unwrap_or_else(|| "tool failed".to_string())
                    )
                };
                messages.push(ChatMessage::tool_result(call.id.clone(), content));
            }
        }

        // Turn budget exhausted — request a final text-only answer.
        tracing::warn!(
            "tool turn budget ({}) exhausted, forcing final answer",
            self.config.llm.max_tool_turns
        );
        let completion = self.transport.complete(model, &messages, &[]).await?;
        let text = completion.text.unwrap_or_default();
        self.record(query, &text).await;
        Ok(text)
    }

    /// Append the completed turn to the interaction log and, when an
    /// embedder is available, vectorize it inline. Neither failure loses
    /// the answer.
    async fn record(&self, prompt: &str, response: &str) {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let timestamp = chrono::Utc::now().timestamp();

        let entry = match self.store.append(prompt, response, &cwd, timestamp).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("failed to record interaction: {:#}", e);
                return;
            }
        };

        if let Some(provider) = &self.embedder {
            let text = embedding_text(prompt, response);
            match embedding::embed_query(provider.as_ref(), &self.config.embedding, &text).await {
                Ok(vector) => {
                    if let Err(e) = self
                        .store
                        .upsert_embedding(entry.id, &vector, provider.model_name())
                        .await
                    {
                        tracing::debug!("failed to store embedding: {:#}", e);
                    }
                }
                Err(e) => tracing::debug!("inline embedding skipped: {:#}", e),
            }
        }
    }
}

/// The text an interaction is embedded from.
pub fn embedding_text(prompt: &str, response: &str) -> String {
    format!("{}\n{}", prompt, response)
}

/// Backfill embeddings for entries that have none.
///
/// Used by `sage embed pending`; requires an enabled embedding provider.
pub async fn run_embed_pending(
    config: &EmbeddingConfig,
    store: &Arc<dyn InteractionStore>,
    limit: Option<i64>,
) -> Result<usize> {
    if !config.is_enabled() {
        anyhow::bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let provider = embedding::create_provider(config)?;

    let pending = store.missing_embeddings(limit.unwrap_or(i64::MAX)).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut embedded = 0usize;
    for batch in pending.chunks(config.batch_size.max(1)) {
        let texts: Vec<String> = batch
            .iter()
            .map(|e| embedding_text(&e.prompt, &e.response))
            .collect();
        let vectors = embedding::embed_texts(provider.as_ref(), config, &texts).await?;

        for (entry, vector) in batch.iter().zip(vectors.iter()) {
            store
                .upsert_embedding(entry.id, vector, provider.model_name())
                .await?;
            embedded += 1;
        }
    }

    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::assemble::AssembleParams;
    use crate::commands::CommandPreferences;
    use crate::files::FileProvider;
    use crate::history::HistorySource;
    use crate::llm::{Completion, ToolCallRequest};
    use crate::mcp::{CatalogResource, CatalogTool, ToolCatalog};
    use crate::models::{HistoryEntry, InteractionEntry, RetrievalResult};
    use crate::search::SessionSearch;
    use crate::store::memory::InMemoryStore;

    struct ScriptedTransport {
        turns: Mutex<Vec<Completion>>,
    }

    impl ScriptedTransport {
        fn new(turns: Vec<Completion>) -> Self {
            Self {
                turns: Mutex::new(turns),
            }
        }
    }

    #[async_trait]
    impl LlmTransport for ScriptedTransport {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            tools: &[Value],
        ) -> Result<Completion> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() || tools.is_empty() {
                // Out of script (or tool-less final turn): plain answer.
                return Ok(Completion {
                    text: Some("final answer".to_string()),
                    tool_calls: Vec::new(),
                });
            }
            Ok(turns.remove(0))
        }
    }

    struct EmptySession;

    #[async_trait]
    impl SessionSearch for EmptySession {
        async fn search(&self, _query: &str, _limit: i64) -> Result<Vec<RetrievalResult>> {
            Ok(Vec::new())
        }
        async fn recent(&self, _n: i64) -> Result<Vec<InteractionEntry>> {
            Ok(Vec::new())
        }
    }

    struct EmptyHistory;

    #[async_trait]
    impl HistorySource for EmptyHistory {
        async fn last_entries(&self, _n: usize) -> Result<Vec<HistoryEntry>> {
            Ok(vec![HistoryEntry {
                timestamp: 0,
                duration: 0,
                command: "make build".to_string(),
            }])
        }
    }

    struct EmptyFiles;

    #[async_trait]
    impl FileProvider for EmptyFiles {
        async fn list_files(&self, _limit: usize) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn file_content(&self, path: &str, _max_lines: usize) -> String {
            format!("Error reading file {}: not found", path)
        }
    }

    struct EmptyCatalog;

    #[async_trait]
    impl ToolCatalog for EmptyCatalog {
        async fn tools(&self) -> Result<Vec<CatalogTool>> {
            Ok(Vec::new())
        }
        async fn resources(&self, _query: &str) -> Result<Vec<CatalogResource>> {
            Ok(Vec::new())
        }
    }

    struct NoDocs;

    #[async_trait]
    impl crate::docs::DocsProvider for NoDocs {
        async fn lookup(&self, _command: &str) -> Option<String> {
            None
        }
    }

    fn engine_with(transport: ScriptedTransport) -> (QueryEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let session: Arc<dyn SessionSearch> = Arc::new(EmptySession);
        let history: Arc<dyn HistorySource> = Arc::new(EmptyHistory);
        let files: Arc<dyn FileProvider> = Arc::new(EmptyFiles);
        let catalog: Arc<dyn ToolCatalog> = Arc::new(EmptyCatalog);

        let assembler = ContextAssembler::new(
            CommandPreferences::detect(),
            history.clone(),
            session.clone(),
            files.clone(),
            catalog,
            AssembleParams {
                recent_commands: 15,
                session_hits: 3,
                file_list_limit: 50,
                inline_max_lines: 200,
            },
        );

        let tool_ctx = ToolContext {
            session,
            history,
            files,
            docs: Arc::new(NoDocs),
        };

        let engine = QueryEngine::new(
            Config::default(),
            Arc::new(transport),
            assembler,
            ToolRegistry::with_builtins(),
            tool_ctx,
            store.clone(),
        );
        (engine, store)
    }

    fn tool_call_turn(name: &str, arguments: Value) -> Completion {
        Completion {
            text: None,
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments,
            }],
        }
    }

    #[tokio::test]
    async fn test_plain_answer_records_one_interaction() {
        let (engine, store) = engine_with(ScriptedTransport::new(vec![Completion {
            text: Some("use `tar -xzf`".to_string()),
            tool_calls: Vec::new(),
        }]));

        let answer = engine
            .run("how do I extract a tarball", &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(answer, "use `tar -xzf`");
        assert_eq!(store.count().await.unwrap(), 1);
        let recent = store.recent(1).await.unwrap();
        assert_eq!(recent[0].prompt, "how do I extract a tarball");
        assert_eq!(recent[0].response, "use `tar -xzf`");
    }

    #[tokio::test]
    async fn test_tool_turns_are_not_recorded_separately() {
        let (engine, store) = engine_with(ScriptedTransport::new(vec![
            tool_call_turn("get_recent_commands", serde_json::json!({})),
            Completion {
                text: Some("you ran make build".to_string()),
                tool_calls: Vec::new(),
            },
        ]));

        let answer = engine
            .run("what did I run?", &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(answer, "you ran make build");
        // One entry for the whole query, despite the tool sub-turn.
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_call_feeds_error_back() {
        let (engine, store) = engine_with(ScriptedTransport::new(vec![
            tool_call_turn("not_a_tool", serde_json::json!({})),
            Completion {
                text: Some("recovered".to_string()),
                tool_calls: Vec::new(),
            },
        ]));

        let answer = engine.run("hm", &QueryOptions::default()).await.unwrap();
        assert_eq!(answer, "recovered");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_turn_budget_forces_final_answer() {
        // Script far more tool turns than the budget allows.
        let turns: Vec<Completion> = (0..32)
            .map(|_| tool_call_turn("list_project_files", serde_json::json!({})))
            .collect();
        let (engine, _) = engine_with(ScriptedTransport::new(turns));

        let answer = engine.run("loop forever", &QueryOptions::default()).await.unwrap();
        assert_eq!(answer, "final answer");
    }

    #[tokio::test]
    async fn test_no_context_skips_assembly() {
        let (engine, _) = engine_with(ScriptedTransport::new(vec![Completion {
            text: Some("ok".to_string()),
            tool_calls: Vec::new(),
        }]));

        let opts = QueryOptions {
            no_context: true,
            ..Default::default()
        };
        assert_eq!(engine.run("quick one", &opts).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_embed_pending_disabled_provider_errors() {
        let store: Arc<dyn InteractionStore> = Arc::new(InMemoryStore::new());
        let result = run_embed_pending(&EmbeddingConfig::default(), &store, None).await;
        assert!(result.is_err());
    }
}
