pub mod amount;
pub mod canonical;
pub mod chain;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod nodes;
pub mod pool;
pub mod pow;
pub mod validate;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

pub use amount::Amount;
pub use chain::{Chain, ChainStore, MemoryStore};
pub use consensus::{ChainResponse, ConsensusConfig, ConsensusResolver, NodeClient};
pub use error::{LedgerError, MiningError, PeerError};
pub use nodes::NodeRegistry;
pub use pool::TransactionPool;
pub use pow::{Miner, MinerConfig, ProofOfWork, StopSignal};
pub use validate::Validator;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: Amount,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Amount>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }
}

/// One link of the chain. Field names are the wire and storage format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// Lowercase hex SHA-256 of the canonical, key-sorted encoding.
    pub fn hash(&self) -> String {
        // Strings and numbers only; non-finite floats encode as `null`.
        let encoded = canonical::to_canonical_json(self);
        debug_assert!(encoded.is_ok(), "block {} failed to encode", self.index);
        match encoded {
            Ok(encoded) => sha256_hex(&encoded),
            Err(e) => {
                error!("block {} failed to encode: {}", self.index, e);
                sha256_hex(&serde_json::to_vec(self).unwrap_or_default())
            }
        }
    }
}

/// Free-function form of [`Block::hash`].
pub fn hash(block: &Block) -> String {
    block.hash()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Seconds since the epoch with sub-second precision.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
