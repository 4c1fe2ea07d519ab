use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration, read from `~/.config/shell-sage/config.toml`.
///
/// Every section and field has a default so the assistant works with no
/// config file at all; `load_config` on a missing path yields `Config::default()`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_tool_turns: default_max_tool_turns(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_max_tool_turns() -> usize {
    8
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shell-sage")
        .join("sessions.sqlite")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    /// Weight for semantic vs lexical: `hybrid = (1-α)*lexical + α*semantic`.
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    /// Candidates fetched from each retrieval path before fusion.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: i64,
    /// Hybrid hits merged into the assembled session context.
    #[serde(default = "default_session_hits")]
    pub session_hits: i64,
    /// Default result cap for `sage`-level searches.
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k: default_candidate_k(),
            session_hits: default_session_hits(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> i64 {
    40
}
fn default_session_hits() -> i64 {
    3
}
fn default_final_limit() -> i64 {
    12
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_docs_cache_dir")]
    pub cache_dir: PathBuf,
    /// Cache ceiling in megabytes.
    #[serde(default = "default_max_cache_mb")]
    pub max_cache_mb: u64,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_docs_cache_dir(),
            max_cache_mb: default_max_cache_mb(),
        }
    }
}

fn default_docs_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shell-sage")
        .join("docs")
}
fn default_max_cache_mb() -> u64 {
    100
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    /// Path to the shell history file. Defaults to `~/.zsh_history`.
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
    /// How many recent commands the assembler includes.
    #[serde(default = "default_recent_count")]
    pub recent_count: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            recent_count: default_recent_count(),
        }
    }
}

fn default_history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".zsh_history")
}
fn default_recent_count() -> usize {
    15
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilesConfig {
    /// Maximum entries in the assembled directory listing.
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    /// Line cap when inlining a query-mentioned file's content.
    #[serde(default = "default_inline_max_lines")]
    pub inline_max_lines: usize,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
            inline_max_lines: default_inline_max_lines(),
            exclude_globs: default_exclude_globs(),
        }
    }
}

fn default_list_limit() -> usize {
    50
}
fn default_inline_max_lines() -> usize {
    200
}
fn default_exclude_globs() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
    ]
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct McpConfig {
    /// Named MCP servers to spawn over stdio and query for tool catalogs.
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Default config file location: `~/.config/shell-sage/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shell-sage")
        .join("config.toml")
}

/// Load configuration from `path`, falling back to full defaults when the
/// file does not exist. A file that exists but fails to parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Persist the configuration back to `path`, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
