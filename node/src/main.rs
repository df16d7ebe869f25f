//! Boardsync node: the real-time collaboration server for multi-user
//! diagram editing.

use anyhow::Context;
use boardsync_engine::EngineConfig;
use boardsync_network::{CollabServer, ServerConfig};
use boardsync_persistence::{
    CacheStore, DocumentStore, FileDocumentStore, MemoryCacheStore, MemoryDocumentStore,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "boardsync-node", about = "Boardsync collaboration server")]
struct NodeArgs {
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = boardsync_network::DEFAULT_PORT)]
    port: u16,

    /// Exact allowed front-end origin
    #[arg(long, env = "FRONTEND_URL")]
    frontend_url: Option<String>,

    /// Comma-separated allowed origin patterns (`*` wildcards permitted)
    #[arg(long, env = "CORS_ORIGIN_PATTERNS", value_delimiter = ',')]
    cors_origin_patterns: Vec<String>,

    /// Directory for durable diagram documents and history
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Keep documents in memory only (no durable storage)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = NodeArgs::parse();
    info!(port = args.port, "starting boardsync node");

    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let docs: Arc<dyn DocumentStore> = if args.in_memory {
        info!("document store: in-memory");
        Arc::new(MemoryDocumentStore::new())
    } else {
        info!(dir = %args.data_dir.display(), "document store: filesystem");
        Arc::new(
            FileDocumentStore::new(&args.data_dir)
                .with_context(|| format!("opening data dir {}", args.data_dir.display()))?,
        )
    };

    let config = ServerConfig {
        port: args.port,
        frontend_url: args.frontend_url,
        origin_patterns: args.cors_origin_patterns,
    };
    let server = CollabServer::new(config, cache, docs, EngineConfig::default());

    server
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    info!("boardsync node stopped");
    Ok(())
}
