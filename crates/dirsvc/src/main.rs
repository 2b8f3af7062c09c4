//! Shardnet directory-service node binary.
//!
//! Wires the DS core to its collaborators, opens the block store, and runs
//! the framed-TCP intake loop that feeds inbound messages to the dispatcher.
//! Each frame is a `u32` big-endian length followed by one DS message.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shardnet_config::Config;
use shardnet_crypto::SecretKey;
use shardnet_dirsvc::{
    DevPowEngine, DirectoryService, DsBlockChain, LoopbackConsensus, NoopShardNode, PeerStore,
    QueueLookup, Services, TxBlockChain, Whitelist,
};
use shardnet_storage::BlockStorage;
use shardnet_types::{DsBlock, Peer, TxBlock};

/// Largest frame the intake loop accepts.
const MAX_MESSAGE_SIZE: u32 = 4 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "shardnet-node", about = "Shardnet directory-service node")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "shardnet.toml")]
    config: PathBuf,

    /// Override the storage directory from the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Bootstrap: the round-0 leader's address. When it matches this node's
    /// own endpoint, this node leads the first consensus round.
    #[arg(long)]
    primary: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        warn!(path = %args.config.display(), "config file not found; using defaults");
        Config::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone())),
        )
        .init();

    let data_dir = args
        .data_dir
        .unwrap_or_else(|| PathBuf::from(&config.storage.path));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let config = Arc::new(config);
    let storage = Arc::new(
        BlockStorage::open(&data_dir, config.node.lookup_node_mode)
            .context("opening block storage")?,
    );
    let ds_chain = Arc::new(DsBlockChain::new(DsBlock::genesis(
        config.pow.difficulty,
        config.pow.ds_difficulty,
    )));
    let tx_chain = Arc::new(TxBlockChain::new(TxBlock::genesis()));

    let identity = SecretKey::random();
    let self_peer = Peer::new(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        config.node.listen_port,
    );
    info!(key = %identity.public_key(), peer = %self_peer, "node identity");

    let lookup = Arc::new(QueueLookup::new());
    let services = Services {
        storage,
        ds_chain,
        tx_chain,
        peer_store: Arc::new(PeerStore::new()),
        whitelist: Arc::new(Whitelist::new(config.node.exclude_private_ip)),
        lookup: lookup.clone(),
        pow_engine: Arc::new(DevPowEngine::new()),
        consensus_factory: Arc::new(LoopbackConsensus),
        shard_node: Arc::new(NoopShardNode),
    };
    let service = DirectoryService::new(
        config.clone(),
        identity.public_key().clone(),
        self_peer,
        services,
    );

    // Bootstrap: inject SetPrimary as if it came off the wire.
    if let Some(primary) = args.primary {
        let mut message = vec![shardnet_dirsvc::InstructionTag::SetPrimary as u8];
        message.extend_from_slice(&Peer::from(primary).to_bytes());
        let bootstrap_service = service.clone();
        let from = self_peer;
        tokio::task::spawn_blocking(move || {
            bootstrap_service.execute(&message, &from);
        });
    }

    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.node.listen_port);
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "listening for DS messages");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (mut stream, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let service = service.clone();
                tokio::spawn(async move {
                    let len = match stream.read_u32().await {
                        Ok(len) if len <= MAX_MESSAGE_SIZE => len,
                        Ok(len) => {
                            warn!(%remote, len, "oversized frame dropped");
                            return;
                        }
                        Err(e) => {
                            warn!(%remote, error = %e, "failed to read frame length");
                            return;
                        }
                    };
                    let mut message = vec![0u8; len as usize];
                    if let Err(e) = stream.read_exact(&mut message).await {
                        warn!(%remote, error = %e, "failed to read frame");
                        return;
                    }
                    let from = Peer::from(remote);
                    let _ = tokio::task::spawn_blocking(move || service.execute(&message, &from))
                        .await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    // Drain anything the core queued for the lookup network before exit.
    let pending = lookup.drain_requests();
    if !pending.is_empty() {
        info!(count = pending.len(), "unsent lookup requests at shutdown");
    }
    service.shutdown();
    Ok(())
}
