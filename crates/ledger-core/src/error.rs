//! Error types shared across the ledger engine.

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by chain mutation, registration and mining.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid node address: {0:?}")]
    InvalidAddress(String),

    #[error("chain has no blocks; genesis was never minted")]
    EmptyChain,

    #[error(transparent)]
    Mining(#[from] MiningError),

    #[error("chain store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Why a proof search stopped without a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("mining deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },

    #[error("gave up after {attempts} attempts")]
    AttemptsExhausted { attempts: u64 },
}

/// Per-peer fetch failures. Consensus skips the peer and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("peer {peer} did not answer within {after:?}")]
    Timeout { peer: String, after: Duration },

    #[error("peer {peer} sent an invalid response: {reason}")]
    InvalidResponse { peer: String, reason: String },

    #[error("peer {peer} offered an invalid chain: {reason}")]
    ChainInvalid { peer: String, reason: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
