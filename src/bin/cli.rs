//! Local inspection CLI for the memory store: remember/recall/stats without
//! going through the MCP transport.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memnesis::engine::RememberOutcome;
use memnesis::error::Result;
use memnesis::types::{EngineConfig, StorageMode, EMBEDDING_DIM};
use memnesis::MemoryEngine;

#[derive(Parser, Debug)]
#[command(name = "memnesis-cli")]
#[command(about = "Inspect and poke a memnesis store from the shell")]
struct Args {
    #[arg(long, env = "MEMNESIS_DATA_DIR")]
    data_dir: Option<String>,

    #[arg(long, env = "MEMNESIS_STORAGE_MODE", default_value = "local")]
    storage_mode: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a new memory
    Remember {
        content: String,
        #[arg(long, default_value = "note")]
        memory_type: String,
        #[arg(long, default_value_t = 0.5)]
        importance: f32,
        #[arg(long)]
        project: Option<String>,
    },
    /// Hybrid search over stored memories
    Recall {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        project: Option<String>,
    },
    /// Print storage + graph totals
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let storage_mode = match args.storage_mode.as_str() {
        "cloud-safe" => StorageMode::CloudSafe,
        _ => StorageMode::Local,
    };
    let data_dir = match args.data_dir {
        Some(d) => std::path::PathBuf::from(shellexpand::tilde(&d).to_string()),
        None => EngineConfig::default().data_dir,
    };
    let engine = MemoryEngine::open(EngineConfig { data_dir, storage_mode, embedding_dim: EMBEDDING_DIM })?;

    match args.command {
        Command::Remember { content, memory_type, importance, project } => {
            let outcome =
                engine.remember(&content, &memory_type, importance, project, None, None, false, &[])?;
            match outcome {
                RememberOutcome::Written { id } => println!("stored as {id}"),
                RememberOutcome::ConflictsFound { conflicts } => {
                    println!("conflicts found: {conflicts:?}");
                }
            }
        }
        Command::Recall { query, limit, project } => {
            let results = engine.recall(&query, limit, project.as_deref(), &[], None, true)?;
            if results.is_empty() {
                println!("no matches");
            }
            for r in results {
                println!("{} [{}] relevance={:.3} — {}", r.id, r.memory_type, r.relevance, r.content);
            }
        }
        Command::Stats => {
            let stats = engine.get_stats()?;
            println!(
                "{} memories ({} active, {} archived); graph: {} nodes, {} edges",
                stats.total, stats.active, stats.archived, stats.graph_nodes, stats.graph_edges
            );
            for (t, count) in stats.by_type {
                println!("  {t}: {count}");
            }
        }
    }

    Ok(())
}
