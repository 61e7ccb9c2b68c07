//! kadmesh CLI: parses arguments, initialises tracing, constructs a DHT
//! peer backed by in-memory storage, bootstraps against any peers supplied
//! on the command line, then idles while the peer services inbound RPCs.

use clap::Parser;
use kadmesh::{DhtConfig, Id, InMemoryStorage, Result};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "A Kademlia DHT peer", long_about = None)]
struct Args {
    /// Log filter directive (e.g. "info", "kadmesh=debug").
    #[arg(short, long)]
    verbosity: Option<String>,

    /// Directory for peer state (currently unused: the core keeps its
    /// routing table and storage entirely in memory).
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// A known peer to bootstrap from, given as a hex-encoded 160-bit ID.
    /// May be repeated.
    #[arg(long = "bootstrap")]
    bootstrap_peers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DhtConfig::load(args.config.as_deref())?;
    if let Some(verbosity) = args.verbosity {
        config.log_filter = verbosity;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    for peer in args.bootstrap_peers {
        config.bootstrap_peers.push(peer);
    }

    use tracing_subscriber::{fmt, EnvFilter};
    fmt().with_env_filter(EnvFilter::new(&config.log_filter)).init();

    tracing::info!(port = config.bind_port, "starting kadmesh");

    let our_id = Id::random(&mut rand::thread_rng());
    let storage = Arc::new(InMemoryStorage::new());
    let _dht = kadmesh::Dht::with_config(
        our_id,
        storage,
        config.k,
        config.alpha,
        std::time::Duration::from_secs(config.rpc_timeout_secs),
        config.bucket_split_threshold,
    );
    tracing::info!(id = %our_id, "local peer identity assigned");

    // No wire transport is wired into this binary, so a bootstrap peer given
    // on the command line can't be dialed yet; a deployment that adds a real
    // network `Protocol` implementation resolves these addresses to live
    // contacts over that transport and calls `Dht::bootstrap` with each.
    for peer in &config.bootstrap_peers {
        tracing::warn!(
            peer,
            "no wire transport is wired into this binary; skipping bootstrap"
        );
    }

    tracing::info!("kadmesh is idle; press ctrl-c to exit");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
