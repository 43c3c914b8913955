//! # Evidence Harness CLI (`evh`)
//!
//! ```bash
//! evh --config ./config/evh.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `evh init` | Create the SQLite database and run schema migrations |
//! | `evh load <seed.json>` | Load documents, graph and templates |
//! | `evh stats` | Row counts per table |
//! | `evh templates` | List stored query templates |
//! | `evh plan "<query>"` | Propose strategies and templates for a query |
//! | `evh ask "<query>" --strategy <key>` | Run one orchestrated turn |
//! | `evh sweep "<query>"` | Sweep every channel with the judge loop |
//!
//! Every command prints pretty JSON on stdout. Logs go to stderr and are
//! filtered with `RUST_LOG` (default `info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use evidence_harness::assistant::Assistant;
use evidence_harness::config::{self, Config};
use evidence_harness::embedding::create_embedder;
use evidence_harness::sqlite_store::SqliteStore;
use evidence_harness::{db, migrate, seed};
use evidence_harness_core::models::Params;
use evidence_harness_core::strategy::StrategyOptions;
use evidence_harness_core::ExecuteRequest;

/// Evidence Harness: strategy-orchestrated retrieval over documents,
/// templated SQL and a knowledge graph.
#[derive(Parser)]
#[command(name = "evh", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/evh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Load a seed file (documents, graph nodes and edges, templates).
    Load {
        /// Path to the seed JSON file.
        path: PathBuf,
    },

    /// Show row counts per table.
    Stats,

    /// List stored query templates.
    Templates,

    /// Plan a query: proposed strategies and matching templates.
    Plan {
        query: String,
    },

    /// Run one orchestrated turn for a new conversation.
    Ask {
        query: String,

        /// Strategy key: vector, hybrid, graph, structured_template
        /// (aliases: sql_template, template).
        #[arg(long, short)]
        strategy: String,

        /// Restrict chunk search to one document.
        #[arg(long)]
        document: Option<String>,

        /// Template id for the structured strategy.
        #[arg(long)]
        template: Option<String>,

        /// Template parameter binding, `name=value`. Repeatable.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Graph expansion depth.
        #[arg(long)]
        hops: Option<usize>,

        /// Extra context appended to the query.
        #[arg(long)]
        followup: Option<String>,

        /// Also compose an answer from the accepted evidence.
        #[arg(long)]
        answer: bool,
    },

    /// Sweep every channel and let the judge refine the query.
    Sweep {
        query: String,

        #[arg(long)]
        followup: Option<String>,
    },
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn load(cfg: &Config, path: &PathBuf) -> Result<()> {
    let seed_file = seed::read_seed(path)?;
    let pool = db::connect(cfg).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);
    let embedder = create_embedder(&cfg.embedding)?;
    let report = seed::load_seed(&store, embedder.as_ref(), &seed_file).await?;
    store.pool().close().await;
    print_json(&report)
}

async fn stats(cfg: &Config) -> Result<()> {
    let pool = db::connect(cfg).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);
    let stats = store.stats().await?;
    store.pool().close().await;
    print_json(&json!({
        "database": cfg.db.path.display().to_string(),
        "counts": stats,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            print_json(&json!({
                "status": "initialized",
                "database": cfg.db.path.display().to_string(),
            }))?;
        }
        Commands::Load { path } => load(&cfg, &path).await?,
        Commands::Stats => stats(&cfg).await?,
        Commands::Templates => {
            let assistant = Assistant::from_config(&cfg).await?;
            print_json(&assistant.templates().await?)?;
        }
        Commands::Plan { query } => {
            let assistant = Assistant::from_config(&cfg).await?;
            print_json(&assistant.start(&query).await?)?;
        }
        Commands::Ask {
            query,
            strategy,
            document,
            template,
            params,
            hops,
            followup,
            answer,
        } => {
            let assistant = Assistant::from_config(&cfg).await?;
            let state = assistant.start(&query).await?;
            let request = ExecuteRequest {
                strategy,
                options: StrategyOptions {
                    document_id: document,
                    template_id: template,
                    params: params.into_iter().collect::<Params>(),
                    hops,
                },
                user_followup: followup,
            };
            let turn = assistant
                .execute(&state.conversation_id, &request)
                .await?;
            let answer = if answer {
                Some(assistant.answer(&state.conversation_id).await?)
            } else {
                None
            };
            print_json(&json!({ "turn": turn, "answer": answer }))?;
        }
        Commands::Sweep { query, followup } => {
            let assistant = Assistant::from_config(&cfg).await?;
            let state = assistant.start(&query).await?;
            let report = assistant
                .sweep(&state.conversation_id, followup.as_deref())
                .await?;
            let state = assistant.snapshot(&state.conversation_id).await?;
            print_json(&json!({ "sweep": report, "state": state }))?;
        }
    }

    Ok(())
}
