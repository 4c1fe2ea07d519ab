//! # shell-sage CLI (`sage`)
//!
//! The `sage` binary answers natural-language questions on the command line,
//! grounding every answer in locally assembled context.
//!
//! ## Usage
//!
//! ```bash
//! sage "how do I find large files?"          # one-shot query
//! sage                                       # interactive mode
//! echo "why did make fail" | sage            # query from stdin
//! sage --show-context "docker cleanup"       # print the bundle, skip the LLM
//! sage --show-prefs                          # detected command preferences
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sage init` | Create the SQLite database and run schema migrations |
//! | `sage config set model <name>` | Set the default model |
//! | `sage config list` | Show current configuration |
//! | `sage stats` | Interaction counts, embedding coverage, cache usage |
//! | `sage embed pending` | Backfill missing interaction embeddings |

use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use shell_sage::assemble::{AssembleParams, ContextAssembler};
use shell_sage::commands::CommandPreferences;
use shell_sage::config::{self, Config};
use shell_sage::docs::{CommandDocs, DocsProvider};
use shell_sage::docs_cache::DocsCache;
use shell_sage::files::{FileProvider, WorkspaceFiles};
use shell_sage::history::{HistorySource, ZshHistory};
use shell_sage::llm::OpenAiTransport;
use shell_sage::mcp::{McpCatalog, ToolCatalog};
use shell_sage::query::{run_embed_pending, QueryEngine, QueryOptions};
use shell_sage::search::{RetrievalEngine, SessionSearch};
use shell_sage::sqlite_store::SqliteInteractionStore;
use shell_sage::store::InteractionStore;
use shell_sage::tools::{ToolContext, ToolRegistry};
use shell_sage::{db, migrate, stats};

/// shell-sage — a context-aware terminal assistant.
#[derive(Parser)]
#[command(
    name = "sage",
    about = "A context-aware terminal assistant",
    version,
    args_conflicts_with_subcommands = true,
    subcommand_precedence_over_arg = true,
    long_about = "shell-sage answers natural-language queries by assembling local context \
    (terminal history, past interactions via hybrid search, project files, command docs, \
    MCP tool catalogs) and forwarding it to a remote LLM, which may call back into a fixed \
    set of internal context tools mid-answer."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.config/shell-sage/config.toml`. A missing file means
    /// built-in defaults for everything.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// The query to ask (omit to start interactive mode).
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,

    /// Model to use for this invocation.
    #[arg(short, long)]
    model: Option<String>,

    /// System prompt override.
    #[arg(long)]
    system: Option<String>,

    /// Skip context gathering (fast mode).
    #[arg(long)]
    no_context: bool,

    /// Print the assembled context without calling the LLM.
    #[arg(long)]
    show_context: bool,

    /// Print detected command preferences and exit.
    #[arg(long)]
    show_prefs: bool,

    /// Show debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the session database.
    ///
    /// Creates the SQLite database file and all required tables
    /// (interactions, interactions_fts, interaction_vectors). Idempotent.
    Init,

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show session statistics.
    ///
    /// Interaction counts, embedding coverage, and documentation cache
    /// usage.
    Stats,

    /// Manage interaction embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
}

/// Configuration subcommands.
#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value.
    ///
    /// Currently `model` is the only settable key.
    Set {
        /// Configuration key (e.g. `model`).
        key: String,
        /// Configuration value.
        value: String,
    },
    /// Show current configuration.
    #[command(alias = "show")]
    List,
}

/// Embedding subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed stored interactions that have no vector yet.
    ///
    /// Requires an embedding provider in the `[embedding]` config section.
    Pending {
        /// Maximum number of interactions to embed in this run.
        #[arg(long)]
        limit: Option<i64>,
    },
}

/// The wired-up collaborators for one CLI session.
struct Session {
    store: Arc<dyn InteractionStore>,
    assembler: ContextAssembler,
    tool_ctx: ToolContext,
}

/// Build the store, retrieval engine, and context collaborators.
///
/// Everything except the LLM transport — `--show-context` works without an
/// API key.
async fn build_session(cfg: &Config) -> Result<Session> {
    migrate::run_migrations(cfg).await?;
    let pool = db::connect(cfg).await?;

    let store: Arc<dyn InteractionStore> = Arc::new(SqliteInteractionStore::new(pool));
    let engine = Arc::new(RetrievalEngine::new(
        store.clone(),
        cfg.retrieval.clone(),
        cfg.embedding.clone(),
    ));
    let session: Arc<dyn SessionSearch> = engine;

    let history: Arc<dyn HistorySource> = Arc::new(ZshHistory::new(cfg.history.path.clone()));
    let cwd = std::env::current_dir()?;
    let files: Arc<dyn FileProvider> = Arc::new(WorkspaceFiles::new(cwd, &cfg.files)?);
    let cache = Arc::new(DocsCache::new(
        cfg.docs.cache_dir.clone(),
        cfg.docs.max_cache_mb * 1024 * 1024,
    ));
    let docs: Arc<dyn DocsProvider> = Arc::new(CommandDocs::new(cache));
    let catalog: Arc<dyn ToolCatalog> = Arc::new(McpCatalog::connect_all(&cfg.mcp).await);

    let assembler = ContextAssembler::new(
        CommandPreferences::detect(),
        history.clone(),
        session.clone(),
        files.clone(),
        catalog,
        AssembleParams {
            recent_commands: cfg.history.recent_count,
            session_hits: cfg.retrieval.session_hits,
            file_list_limit: cfg.files.list_limit,
            inline_max_lines: cfg.files.inline_max_lines,
        },
    );

    let tool_ctx = ToolContext {
        session,
        history,
        files,
        docs,
    };

    Ok(Session {
        store,
        assembler,
        tool_ctx,
    })
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "shell_sage=debug,sage=debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_preferences() {
    let prefs = CommandPreferences::detect();
    println!("Detected command preferences:");
    if prefs.is_empty() {
        println!("  No alternative commands detected");
    } else {
        for (generic, preferred) in prefs.mappings() {
            println!("  {} -> {}", generic, preferred);
        }
    }
    println!();
    println!("Alternatives searched: fd, rg, bat, eza, delta, sd, dust, htop, tldr, z, procs");
}

fn print_config(cfg: &Config) {
    println!("Current configuration:");
    println!();
    println!("  model:       {}", cfg.llm.model);
    println!("  base_url:    {}", cfg.llm.base_url);
    println!("  db:          {}", cfg.db.path.display());
    println!("  docs cache:  {} ({} MB ceiling)", cfg.docs.cache_dir.display(), cfg.docs.max_cache_mb);
    println!("  embeddings:  {}", cfg.embedding.provider);
    println!("  mcp servers: {} configured", cfg.mcp.servers.len());
    for name in cfg.mcp.servers.keys() {
        println!("    - {}", name);
    }
}

async fn run_interactive(engine: &QueryEngine, opts: &QueryOptions) -> Result<()> {
    println!("Entering interactive mode. Type \"exit\" or \"quit\" to leave.");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        // One failed query never ends the session.
        match engine.run(input, opts).await {
            Ok(answer) => println!("{}\n", answer),
            Err(e) => eprintln!("Error: {:#}\n", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let cfg = config::load_config(&config_path)?;

    if let Some(command) = cli.command {
        match command {
            Commands::Init => {
                migrate::run_migrations(&cfg).await?;
                println!("Database initialized successfully.");
            }
            Commands::Config { action } => match action {
                ConfigAction::Set { key, value } => match key.as_str() {
                    "model" | "default-model" => {
                        let mut updated = cfg;
                        updated.llm.model = value.clone();
                        config::save_config(&config_path, &updated)?;
                        println!("Default model set to: {}", value);
                    }
                    other => {
                        bail!("Unknown configuration key \"{}\"", other);
                    }
                },
                ConfigAction::List => {
                    print_config(&cfg);
                }
            },
            Commands::Stats => {
                stats::run_stats(&cfg).await?;
            }
            Commands::Embed { action } => match action {
                EmbedAction::Pending { limit } => {
                    let session = build_session(&cfg).await?;
                    let embedded = run_embed_pending(&cfg.embedding, &session.store, limit).await?;
                    println!("Embedded {} interaction(s).", embedded);
                }
            },
        }
        return Ok(());
    }

    if cli.show_prefs {
        print_preferences();
        return Ok(());
    }

    let mut query = cli.query.join(" ").trim().to_string();

    if cli.show_context {
        let session = build_session(&cfg).await?;
        println!("Gathering context...");
        let context = session.assembler.assemble(&query).await;
        println!("\n=== Assembled Context ===\n");
        println!(
            "{}",
            if context.is_empty() {
                "(no context)"
            } else {
                context.as_str()
            }
        );
        println!("\n=== End Context ===");
        return Ok(());
    }

    // No query argument: read piped stdin, or drop into interactive mode.
    let interactive = query.is_empty() && std::io::stdin().is_terminal();
    if query.is_empty() && !interactive {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        query = buf.trim().to_string();
        if query.is_empty() {
            bail!("No query provided");
        }
    }

    let session = build_session(&cfg).await?;
    let transport = Arc::new(OpenAiTransport::new(&cfg.llm)?);
    let engine = QueryEngine::new(
        cfg.clone(),
        transport,
        session.assembler,
        ToolRegistry::with_builtins(),
        session.tool_ctx,
        session.store,
    );

    let opts = QueryOptions {
        model: cli.model,
        system: cli.system,
        no_context: cli.no_context,
    };

    if interactive {
        run_interactive(&engine, &opts).await?;
    } else {
        println!("Thinking...");
        let answer = engine.run(&query, &opts).await?;
        println!("{}", answer);
    }

    Ok(())
}
