//! Longest-valid-chain resolution against registered peers.
//!
//! Peers are trusted only as far as hash links and proof-of-work go; there is
//! no Byzantine fault tolerance here.

use crate::chain::{Chain, ChainStore};
use crate::constants::{MAX_PEERS_IN_FLIGHT, PEER_TIMEOUT_MS, POW_TARGET_DIFFICULTY};
use crate::error::{PeerError, Result};
use crate::nodes::NodeRegistry;
use crate::pow::ProofOfWork;
use crate::validate::Validator;
use crate::Block;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body of a node's `GET /chain`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: u64,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len() as u64;
        Self { chain, length }
    }
}

/// Transport used to pull a peer's chain.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> std::result::Result<ChainResponse, PeerError>;
}

#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    pub peer_timeout: Duration,
    /// Upper bound on peer fetches running at once.
    pub max_in_flight: usize,
    pub difficulty: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            peer_timeout: Duration::from_millis(PEER_TIMEOUT_MS),
            max_in_flight: MAX_PEERS_IN_FLIGHT,
            difficulty: POW_TARGET_DIFFICULTY,
        }
    }
}

pub struct ConsensusResolver<C: NodeClient + ?Sized> {
    client: Arc<C>,
    validator: Validator,
    config: ConsensusConfig,
}

impl<C: NodeClient + ?Sized> ConsensusResolver<C> {
    pub fn new(client: Arc<C>, config: ConsensusConfig) -> Self {
        Self {
            client,
            validator: Validator::new(ProofOfWork::new(config.difficulty)),
            config,
        }
    }

    /// Replace the local chain with the longest valid peer chain, if any peer
    /// has one strictly longer than ours. Returns whether we replaced.
    ///
    /// Unreachable, slow or lying peers are logged and skipped. Among equally
    /// long winners the lowest peer address is kept.
    pub async fn resolve_conflicts<S: ChainStore + ?Sized>(
        &self,
        chain: &Chain<S>,
        registry: &NodeRegistry,
    ) -> Result<bool> {
        let local = chain.length()?;
        let peers = registry.members();
        if peers.is_empty() {
            debug!("No peers registered; nothing to resolve");
            return Ok(false);
        }

        let mut outcomes: Vec<(String, std::result::Result<ChainResponse, PeerError>)> =
            stream::iter(peers)
                .map(|peer| async move {
                    let outcome = self.fetch(&peer).await;
                    (peer, outcome)
                })
                .buffer_unordered(self.config.max_in_flight.max(1))
                .collect()
                .await;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut max_length = local;
        let mut winner: Option<(String, Vec<Block>)> = None;
        for (peer, outcome) in outcomes {
            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    warn!("Skipping peer: {}", e);
                    continue;
                }
            };
            if response.length <= max_length {
                debug!(
                    "Peer {} has {} blocks, not longer than {}",
                    peer, response.length, max_length
                );
                continue;
            }
            if let Err(fault) = self.validator.validate(&response.chain) {
                let e = PeerError::ChainInvalid {
                    peer,
                    reason: fault.to_string(),
                };
                warn!("Skipping peer: {}", e);
                continue;
            }
            max_length = response.length;
            winner = Some((peer, response.chain));
        }

        match winner {
            Some((peer, blocks)) => {
                let replaced = chain.replace_if_longer(&blocks)?;
                if replaced {
                    info!("Adopted chain of {} blocks from {}", blocks.len(), peer);
                }
                Ok(replaced)
            }
            None => {
                info!("Local chain of {} blocks is authoritative", local);
                Ok(false)
            }
        }
    }

    async fn fetch(&self, peer: &str) -> std::result::Result<ChainResponse, PeerError> {
        let timeout = self.config.peer_timeout;
        let response = tokio::time::timeout(timeout, self.client.fetch_chain(peer))
            .await
            .map_err(|_| PeerError::Timeout {
                peer: peer.to_string(),
                after: timeout,
            })??;
        if response.length != response.chain.len() as u64 {
            return Err(PeerError::InvalidResponse {
                peer: peer.to_string(),
                reason: format!(
                    "reported length {} but sent {} blocks",
                    response.length,
                    response.chain.len()
                ),
            });
        }
        debug!("Peer {} answered with {} blocks", peer, response.length);
        Ok(response)
    }
}
