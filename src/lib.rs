//! # shell-sage
//!
//! **A context-aware terminal assistant.**
//!
//! shell-sage answers natural-language queries on the command line by
//! assembling local context — recent terminal history, relevant past
//! interactions found via hybrid lexical+semantic search, project file
//! listings, cached command documentation, and external MCP tool catalogs —
//! and forwarding the bundle to a remote LLM. Mid-generation, the model may
//! call back into a fixed internal tool surface for on-demand context.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │              Context Assembler                 │
//! │  prefs · history · session · files · catalogs  │
//! └────────┬───────────────────────────────────────┘
//!          ▼                         ▲
//!     prompt bundle            tool results
//!          │                         │
//!          ▼                         │
//!    ┌──────────┐   tool calls  ┌─────────────┐
//!    │   LLM    │──────────────▶│  Dispatcher │
//!    │ transport│◀──────────────│  (5 tools)  │
//!    └────┬─────┘               └─────────────┘
//!         ▼
//!   answer → Interaction Store (SQLite FTS5 + vectors)
//! ```
//!
//! ## Data Flow
//!
//! 1. The **assembler** ([`assemble`]) pulls from its collaborators
//!    concurrently and renders a labeled, bounded context bundle.
//! 2. The **transport** ([`llm`]) runs the completion; the model may issue
//!    internal tool calls, executed by the **dispatcher** ([`tools`]) in a
//!    bounded loop ([`query`]).
//! 3. The completed turn is appended to the **interaction store**
//!    ([`store`], [`sqlite_store`]) and embedded when a provider is
//!    configured ([`embedding`]).
//! 4. Future queries retrieve those turns through the **hybrid engine**
//!    ([`search`]): FTS5 keyword search fused with cosine similarity over
//!    stored vectors.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with full defaults |
//! | [`models`] | Core data types: `InteractionEntry`, `RetrievalResult`, `HistoryEntry` |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`store`] | `InteractionStore` trait + in-memory implementation |
//! | [`sqlite_store`] | SQLite store: FTS5 keyword search, vector scan |
//! | [`search`] | Hybrid retrieval engine with normalized weighted fusion |
//! | [`embedding`] | Embedding provider trait, OpenAI implementation, vector utilities |
//! | [`docs_cache`] | Size-bounded, recency-evicted on-disk docs cache |
//! | [`docs`] | Cache-first `man`/`tldr` documentation lookup |
//! | [`history`] | Terminal history source (zsh formats) |
//! | [`files`] | Project file listings and bounded content reads |
//! | [`commands`] | Preferred command alternative detection |
//! | [`mcp`] | MCP client: external tool/resource catalogs |
//! | [`assemble`] | Fixed-order, failure-tolerant context assembly |
//! | [`tools`] | Internal tool dispatcher (fixed five-tool catalog) |
//! | [`llm`] | OpenAI-compatible chat-completions transport |
//! | [`query`] | End-to-end query loop and interaction recording |
//! | [`stats`] | Session statistics (`sage stats`) |

pub mod assemble;
pub mod commands;
pub mod config;
pub mod db;
pub mod docs;
pub mod docs_cache;
pub mod embedding;
pub mod files;
pub mod history;
pub mod llm;
pub mod mcp;
pub mod migrate;
pub mod models;
pub mod query;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod store;
pub mod tools;

pub use models::{HistoryEntry, InteractionEntry, RetrievalResult, RetrievalSource};
pub use search::{RetrievalEngine, SessionSearch};
pub use store::{EntryCandidate, InteractionStore};
pub use tools::{Tool, ToolContext, ToolOutcome, ToolRegistry};
