//! Memnesis MCP server
//!
//! Run with: memnesis-server

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memnesis::error::Result;
use memnesis::mcp::{McpServer, ToolRouter};
use memnesis::types::{EngineConfig, StorageMode, EMBEDDING_DIM};
use memnesis::MemoryEngine;

#[derive(Parser, Debug)]
#[command(name = "memnesis-server")]
#[command(about = "Memnesis MCP server for AI memory")]
struct Args {
    /// Directory holding memories.db and knowledge_graph.json
    #[arg(long, env = "MEMNESIS_DATA_DIR")]
    data_dir: Option<String>,

    /// Storage mode (local or cloud-safe)
    #[arg(long, env = "MEMNESIS_STORAGE_MODE", default_value = "local")]
    storage_mode: String,

    /// Embedding dimensionality
    #[arg(long, env = "MEMNESIS_EMBEDDING_DIM", default_value_t = EMBEDDING_DIM)]
    embedding_dim: usize,
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

    let config = EngineConfig { data_dir, storage_mode, embedding_dim: args.embedding_dim };

    tracing::info!(data_dir = %config.data_dir.display(), "starting memnesis server");
    let engine = MemoryEngine::open(config)?;
    let router = ToolRouter::new(engine);
    let server = McpServer::new(router);
    server.run()
}
