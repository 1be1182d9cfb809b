mod api;
mod client;
mod constants;

use crate::api::{resolve_periodically, router, AppState};
use crate::client::HttpNodeClient;
use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_LISTEN, MINE_TIMEOUT_SECS};
use clap::Parser;
use ledger_core::constants::{MAX_PEERS_IN_FLIGHT, PEER_TIMEOUT_MS, POW_TARGET_DIFFICULTY};
use ledger_core::{Chain, ChainStore, ConsensusConfig, MemoryStore, NodeClient, NodeRegistry};
use ledger_storage::SledStore;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ledger-node")]
#[command(about = "Proof-of-work ledger node")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Data directory for sled
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Keep the chain in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Leading zero hex digits a proof must produce
    #[arg(long, default_value_t = POW_TARGET_DIFFICULTY)]
    difficulty: usize,

    /// Peer to register at startup (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,

    #[arg(long, default_value_t = PEER_TIMEOUT_MS)]
    peer_timeout_ms: u64,

    #[arg(long, default_value_t = MAX_PEERS_IN_FLIGHT)]
    max_in_flight: usize,

    /// 0 disables the mining deadline
    #[arg(long, default_value_t = MINE_TIMEOUT_SECS)]
    mine_timeout_secs: u64,

    /// Run consensus in the background every N seconds
    #[arg(long)]
    resolve_every_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let store: Arc<dyn ChainStore> = if args.ephemeral {
        info!("using in-memory chain store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SledStore::open(&args.data_dir)?)
    };
    let chain = Chain::new(store);
    if let Some(genesis) = chain.ensure_genesis()? {
        info!("minted genesis block {}", genesis.hash());
    }
    info!("chain holds {} blocks", chain.length()?);

    let registry = NodeRegistry::new();
    for peer in &args.peers {
        match registry.register(peer) {
            Ok(addr) => info!("registered bootstrap peer {}", addr),
            Err(e) => warn!("ignoring bootstrap peer: {}", e),
        }
    }

    let peer_timeout = Duration::from_millis(args.peer_timeout_ms);
    let client: Arc<dyn NodeClient> = Arc::new(HttpNodeClient::new(peer_timeout)?);
    let consensus = ConsensusConfig {
        peer_timeout,
        max_in_flight: args.max_in_flight,
        difficulty: args.difficulty,
    };
    let mine_timeout = (args.mine_timeout_secs > 0)
        .then(|| Duration::from_secs(args.mine_timeout_secs));
    let state = AppState::new(chain, registry, client, consensus, mine_timeout);

    if let Some(secs) = args.resolve_every_secs.filter(|s| *s > 0) {
        tokio::spawn(resolve_periodically(state.clone(), Duration::from_secs(secs)));
    }

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
