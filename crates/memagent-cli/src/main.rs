//! MemAgent CLI
//!
//! The `memagent` command manages an agent's memory pool from the shell.
//!
//! ## Commands
//!
//! - `add`: Consolidate new content into the pool (or insert it as-is)
//! - `search` / `get` / `list`: Read memories
//! - `update` / `delete` / `delete-all` / `reset`: Mutate the pool directly
//! - `history`: Show the audit ledger of one memory
//! - `strength` / `decay`: Score memories and sweep weak ones away
//!
//! Storage comes from `SURREALDB_*` (in-memory when unset, so nothing
//! persists between invocations); embeddings and completions from an
//! OpenAI-compatible endpoint configured through `OPENAI_*`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use memagent_core::obs::MemorySpan;
use memagent_core::{
    CapabilityError, CapabilityResult, Capabilities, Embedder, EngineConfig, LanguageModel,
    MemoryEngine, MemoryId, OpenAiClient, Scope, StateHandle, Stores,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "memagent")]
#[command(author = "MemAgent Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Memory consolidation and decay for AI agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine settings file (TOML); defaults come from MEMAGENT_* variables
    #[arg(long, global = true, env = "MEMAGENT_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Restrict to memories of this user
    #[arg(long, global = true)]
    user: Option<String>,

    /// Restrict to memories of this agent
    #[arg(long, global = true)]
    agent: Option<String>,

    /// Restrict to memories of this run
    #[arg(long, global = true)]
    run: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn scope(&self) -> Scope {
        Scope {
            user_id: self.user.clone(),
            agent_id: self.agent.clone(),
            run_id: self.run.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Add content, reconciling it against related memories
    Add {
        /// Content to remember
        content: String,

        /// Store the content as-is, without fact extraction or a decision
        #[arg(long)]
        no_infer: bool,
    },

    /// Find memories related to a query
    Search {
        /// Query text
        query: String,
    },

    /// Show one memory (counts as an access)
    Get {
        /// Memory ID
        id: String,
    },

    /// List memories in scope, oldest first
    List,

    /// Replace the content of a memory
    Update {
        /// Memory ID
        id: String,

        /// New content
        content: String,
    },

    /// Delete one memory
    Delete {
        /// Memory ID
        id: String,
    },

    /// Delete every memory in scope
    DeleteAll {
        /// Allow deleting without any --user/--agent/--run filter
        #[arg(long)]
        all: bool,
    },

    /// Show the history ledger of a memory
    History {
        /// Memory ID
        id: String,
    },

    /// Show the current strength of a memory
    Strength {
        /// Memory ID
        id: String,
    },

    /// Remove memories whose strength is below a threshold
    Decay {
        /// Strength threshold (default: decay_threshold from config)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Clear records, metadata and history
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    memagent_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    // Initialize database connection
    let handle = StateHandle::setup_from_env()
        .await
        .context("Failed to connect to MemAgent database")?;

    let engine = MemoryEngine::new(Stores::surreal(&handle), capabilities_from_env(), config);
    let scope = cli.scope();

    let output = match cli.command {
        Commands::Add { content, no_infer } => {
            let _span = MemorySpan::enter("cli.add");
            cmd_add(&engine, &content, &scope, !no_infer).await
        }
        Commands::Search { query } => cmd_search(&engine, &query, &scope).await,
        Commands::Get { id } => cmd_get(&engine, &id).await,
        Commands::List => cmd_list(&engine, &scope).await,
        Commands::Update { id, content } => {
            let _span = MemorySpan::enter("cli.update");
            cmd_update(&engine, &id, &content).await
        }
        Commands::Delete { id } => cmd_delete(&engine, &id).await,
        Commands::DeleteAll { all } => cmd_delete_all(&engine, &scope, all).await,
        Commands::History { id } => cmd_history(&engine, &id).await,
        Commands::Strength { id } => cmd_strength(&engine, &id).await,
        Commands::Decay { threshold } => {
            let _span = MemorySpan::enter("cli.decay");
            cmd_decay(&engine, threshold).await
        }
        Commands::Reset { yes } => cmd_reset(&engine, yes).await,
    };

    engine.metrics().flush();
    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

/// Engine settings from a TOML file, else from the environment.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .context(format!("Failed to read config {:?}", path))?;
            EngineConfig::from_toml_str(&text).context(format!("Invalid config {:?}", path))
        }
        None => EngineConfig::from_env().context("Invalid MEMAGENT_* configuration"),
    }
}

/// OpenAI-backed capabilities, or ones that report the missing setup so
/// that read-only commands still work.
fn capabilities_from_env() -> Capabilities {
    match OpenAiClient::from_env() {
        Ok(client) => {
            let client = Arc::new(client);
            Capabilities::from_language_model(client.clone(), client)
        }
        Err(e) => {
            warn!(error = %e, "capabilities not configured; add, search and update will fail");
            let offline = Arc::new(Unconfigured(e.to_string()));
            Capabilities::from_language_model(offline.clone(), offline)
        }
    }
}

/// Capability stand-in used when no endpoint is configured.
struct Unconfigured(String);

#[async_trait]
impl Embedder for Unconfigured {
    async fn embed(&self, _text: &str) -> CapabilityResult<Vec<f32>> {
        Err(CapabilityError::Unavailable(self.0.clone()))
    }
}

#[async_trait]
impl LanguageModel for Unconfigured {
    async fn complete(&self, _prompt: &str) -> CapabilityResult<String> {
        Err(CapabilityError::Unavailable(self.0.clone()))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize output")
}

async fn cmd_add(engine: &MemoryEngine, content: &str, scope: &Scope, infer: bool) -> Result<Value> {
    let result = engine.add(content, scope, infer).await?;
    info!(memory_id = %result.memory_id, event = ?result.event, "add finished");
    to_json(&result)
}

async fn cmd_search(engine: &MemoryEngine, query: &str, scope: &Scope) -> Result<Value> {
    let hits = engine.search(query, scope).await?;
    to_json(&hits)
}

async fn cmd_get(engine: &MemoryEngine, id: &str) -> Result<Value> {
    let record = engine
        .get(&MemoryId::from(id))
        .await
        .context(format!("Memory not found: {}", id))?;
    to_json(&record)
}

async fn cmd_list(engine: &MemoryEngine, scope: &Scope) -> Result<Value> {
    let records = engine.get_all(scope).await?;
    to_json(&records)
}

async fn cmd_update(engine: &MemoryEngine, id: &str, content: &str) -> Result<Value> {
    let record = engine.update(&MemoryId::from(id), content).await?;
    to_json(&record)
}

async fn cmd_delete(engine: &MemoryEngine, id: &str) -> Result<Value> {
    engine.delete(&MemoryId::from(id)).await?;
    Ok(json!({ "deleted": id }))
}

async fn cmd_delete_all(engine: &MemoryEngine, scope: &Scope, all: bool) -> Result<Value> {
    if scope.is_unscoped() && !all {
        bail!("Refusing to delete every memory; pass --user/--agent/--run or --all");
    }
    let removed = engine.delete_all(scope).await?;
    Ok(json!({ "deleted": removed }))
}

async fn cmd_history(engine: &MemoryEngine, id: &str) -> Result<Value> {
    let entries = engine.history(&MemoryId::from(id)).await?;
    to_json(&entries)
}

async fn cmd_strength(engine: &MemoryEngine, id: &str) -> Result<Value> {
    let id = MemoryId::from(id);
    let strength = engine.strength(&id).await?;
    let metadata = engine.metadata(&id).await?;
    Ok(json!({
        "memory_id": id,
        "strength": strength,
        "metadata": metadata,
    }))
}

async fn cmd_decay(engine: &MemoryEngine, threshold: Option<f64>) -> Result<Value> {
    let threshold = threshold.unwrap_or(engine.config().decay_threshold);
    if threshold.is_nan() {
        bail!("Decay threshold must be a number");
    }
    let report = engine.decay(threshold).await?;
    if !report.failed.is_empty() {
        warn!(failed = report.failed.len(), "some memories could not be decayed");
    }
    to_json(&report)
}

async fn cmd_reset(engine: &MemoryEngine, yes: bool) -> Result<Value> {
    if !yes {
        bail!("Reset clears every memory and its history; pass --yes to confirm");
    }
    engine.reset().await?;
    Ok(json!({ "reset": true }))
}
