//! CLI entry point for the fraudgraph relationship resolver.
//!
//! Loads a JSON dataset into the in-memory store, builds the attribute
//! index and writes JSON results to stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use fraudgraph_core::{AttributeKind, EntityKind, ResolverConfig};
use fraudgraph_index::{rebuild_from_store, AttributeIndex};
use fraudgraph_resolve::{ResolutionEngine, ResolveError, ResolveRequest};
use fraudgraph_store::{load_dataset, MemoryEntityStore};

#[derive(Parser)]
#[command(name = "fraudgraph-resolve")]
#[command(about = "Relationship-graph resolver for fraud investigation")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Dataset file: {"users": [...], "transactions": [...]}.
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,

    /// Config file prefix (default: fraudgraph).
    #[arg(short, long, default_value = "fraudgraph", global = true)]
    config: String,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the relationship graph around a user or transaction.
    Resolve {
        /// Seed kind: user or transaction.
        #[arg(long)]
        kind: EntityKind,
        /// Seed id.
        #[arg(long)]
        id: String,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        max_nodes: Option<usize>,
        /// Per-request deadline; 0 disables it.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Resolve a JSON `ResolveRequest` read from stdin.
    Request,
    /// Print attribute index statistics.
    IndexStats,
    /// List entity ids holding an attribute value.
    Lookup {
        /// Attribute kind, e.g. ip, device, email, phone, address, payment_method.
        #[arg(long)]
        attribute: AttributeKind,
        /// Raw value; normalized before lookup.
        #[arg(long)]
        value: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if cli.log_json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let mut config = ResolverConfig::load(&cli.config)?;
    let dataset = cli
        .dataset
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--dataset is required"))?;

    let store = Arc::new(load_dataset(dataset, config.event_buffer)?);
    let index = Arc::new(AttributeIndex::new());
    rebuild_from_store(&index, store.as_ref()).await?;

    match cli.command {
        Command::Resolve {
            kind,
            id,
            max_depth,
            max_nodes,
            timeout_ms,
        } => {
            if let Some(ms) = timeout_ms {
                config.timeout_ms = ms;
            }
            let request = ResolveRequest {
                seed_id: id,
                seed_kind: kind,
                max_depth,
                max_nodes,
            };
            resolve(store, index, config, request).await?;
        }
        Command::Request => {
            let input = std::io::read_to_string(std::io::stdin())?;
            let request: ResolveRequest = serde_json::from_str(&input)?;
            resolve(store, index, config, request).await?;
        }
        Command::IndexStats => {
            println!("{}", serde_json::to_string(&index.stats())?);
        }
        Command::Lookup { attribute, value } => {
            let snapshot = index.snapshot();
            let ids = snapshot.lookup_raw(attribute, &value);
            println!("{}", serde_json::to_string(ids)?);
        }
    }

    Ok(())
}

async fn resolve(
    store: Arc<MemoryEntityStore>,
    index: Arc<AttributeIndex>,
    config: ResolverConfig,
    request: ResolveRequest,
) -> anyhow::Result<()> {
    let engine = ResolutionEngine::new(store, index).with_config(config);
    match engine.resolve(request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        Err(e) => {
            // Still hand the caller whatever was found before the interruption.
            if let Some(partial) = e.partial() {
                println!("{}", serde_json::to_string(partial)?);
            }
            Err(report(e))
        }
    }
}

fn report(e: ResolveError) -> anyhow::Error {
    let retryable = e.is_retryable();
    anyhow::Error::new(e).context(if retryable {
        "resolution failed (retryable)"
    } else {
        "resolution failed"
    })
}
