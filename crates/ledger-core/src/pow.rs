//! Proof-of-work puzzle and the bounded, cancellable proof search.

use crate::constants::{MAX_MINING_ATTEMPTS, POW_BATCH_SIZE, POW_TARGET_DIFFICULTY};
use crate::error::MiningError;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The puzzle: `sha256("{last_proof}{proof}{last_hash}")` must start with
/// `difficulty` zero hex digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(POW_TARGET_DIFFICULTY)
    }
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn valid_proof(&self, last_proof: u64, proof: u64, last_hash: &str) -> bool {
        count_leading_zero_nibbles(&guess_hash(last_proof, proof, last_hash)) >= self.difficulty
    }
}

/// [`ProofOfWork::valid_proof`] at the protocol's default difficulty.
pub fn valid_proof(last_proof: u64, proof: u64, last_hash: &str) -> bool {
    ProofOfWork::default().valid_proof(last_proof, proof, last_hash)
}

pub fn guess_hash(last_proof: u64, proof: u64, last_hash: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(format!("{last_proof}{proof}{last_hash}").as_bytes());
    hasher.finalize().into()
}

/// Leading zero hex digits of the digest's lowercase hex form.
pub fn count_leading_zero_nibbles(hash: &[u8; 32]) -> usize {
    let mut total = 0;
    for b in hash {
        if *b == 0 {
            total += 2;
        } else {
            if *b < 0x10 {
                total += 1;
            }
            break;
        }
    }
    total
}

/// Caller-owned brake for a running search: an explicit cancel flag shared
/// between clones, and an optional wall-clock deadline.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn check(&self, attempts: u64) -> Result<(), MiningError> {
        if self.is_cancelled() {
            return Err(MiningError::Cancelled { attempts });
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(MiningError::DeadlineExceeded { attempts })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MinerConfig {
    pub difficulty: usize,
    /// Proofs handed to the thread pool between two stop checks.
    pub batch_size: u64,
    /// Hard ceiling on proofs tried for one search.
    pub max_attempts: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: POW_TARGET_DIFFICULTY,
            batch_size: POW_BATCH_SIZE,
            max_attempts: MAX_MINING_ATTEMPTS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Miner {
    pow: ProofOfWork,
    batch_size: u64,
    max_attempts: u64,
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(MinerConfig::default())
    }
}

impl Miner {
    pub fn new(config: MinerConfig) -> Self {
        Self {
            pow: ProofOfWork::new(config.difficulty),
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts,
        }
    }

    pub fn with_difficulty(difficulty: usize) -> Self {
        Self::new(MinerConfig {
            difficulty,
            ..MinerConfig::default()
        })
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        self.pow
    }

    /// Smallest `p >= 0` satisfying the puzzle against `(last_proof, last_hash)`.
    ///
    /// Proofs are searched in consecutive batches. Each batch is split across
    /// the rayon pool with `find_first`, so the answer is the same as a plain
    /// 0, 1, 2, ... scan. `stop` is consulted before every batch.
    pub fn solve(
        &self,
        last_proof: u64,
        last_hash: &str,
        stop: &StopSignal,
    ) -> Result<u64, MiningError> {
        let started = Instant::now();
        let mut start = 0u64;
        while start < self.max_attempts {
            stop.check(start).inspect_err(|e| debug!("proof search stopped: {e}"))?;
            let end = start.saturating_add(self.batch_size).min(self.max_attempts);
            let found = (start..end)
                .into_par_iter()
                .find_first(|proof| self.pow.valid_proof(last_proof, *proof, last_hash));
            if let Some(proof) = found {
                info!(
                    "Solved proof {} over last proof {} in {:?}",
                    proof,
                    last_proof,
                    started.elapsed()
                );
                return Ok(proof);
            }
            start = end;
        }
        Err(MiningError::AttemptsExhausted { attempts: start })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_HASH: &str = "7dd0b05c7a6aafba30a3d6c7102d235385a934972e4c066bcea9f6adcbae98f2";

    #[test]
    fn leading_zero_nibbles_examples() {
        let mut h = [0u8; 32];
        assert_eq!(count_leading_zero_nibbles(&h), 64);
        h[0] = 0x0F;
        assert_eq!(count_leading_zero_nibbles(&h), 1);
        h = [0u8; 32];
        h[1] = 0x80;
        assert_eq!(count_leading_zero_nibbles(&h), 2);
        h[1] = 0x08;
        assert_eq!(count_leading_zero_nibbles(&h), 3);
        h = [0xFF; 32];
        assert_eq!(count_leading_zero_nibbles(&h), 0);
    }

    #[test]
    fn nibbles_agree_with_hex_prefix() {
        for proof in 0..500 {
            let digest = guess_hash(100, proof, GENESIS_HASH);
            let hex = hex::encode(digest);
            let prefix = hex.chars().take_while(|c| *c == '0').count();
            assert_eq!(count_leading_zero_nibbles(&digest), prefix);
        }
    }

    #[test]
    fn valid_proof_example() {
        // sha256("1003336" + hash) = 0000d005...
        assert!(valid_proof(100, 3336, GENESIS_HASH));
        assert!(!valid_proof(100, 3335, GENESIS_HASH));
        assert!(!valid_proof(101, 3336, GENESIS_HASH));
    }

    #[test]
    fn difficulty_zero_accepts_anything() {
        let pow = ProofOfWork::new(0);
        assert!(pow.valid_proof(1, 2, "whatever"));
    }

    #[test]
    fn solve_returns_smallest_proof() {
        let miner = Miner::default();
        let proof = miner.solve(100, GENESIS_HASH, &StopSignal::new()).unwrap();
        assert_eq!(proof, 3336);
        assert!((0..proof).all(|p| !valid_proof(100, p, GENESIS_HASH)));
    }

    #[test]
    fn solve_is_batch_size_independent() {
        for batch_size in [1, 7, 64, 10_000] {
            let miner = Miner::new(MinerConfig {
                difficulty: 2,
                batch_size,
                ..MinerConfig::default()
            });
            assert_eq!(miner.solve(100, GENESIS_HASH, &StopSignal::new()), Ok(197));
        }
    }

    #[test]
    fn solve_honours_cancellation() {
        let stop = StopSignal::new();
        stop.cancel();
        let miner = Miner::with_difficulty(64);
        assert_eq!(
            miner.solve(1, "abc", &stop),
            Err(MiningError::Cancelled { attempts: 0 })
        );
    }

    #[test]
    fn solve_honours_deadline() {
        let stop = StopSignal::with_timeout(Duration::from_millis(20));
        let miner = Miner::new(MinerConfig {
            difficulty: 64,
            batch_size: 256,
            max_attempts: u64::MAX,
        });
        match miner.solve(1, "abc", &stop) {
            Err(MiningError::DeadlineExceeded { .. }) => {}
            other => panic!("expected deadline, got {other:?}"),
        }
    }

    #[test]
    fn solve_gives_up_at_attempt_ceiling() {
        let miner = Miner::new(MinerConfig {
            difficulty: 64,
            batch_size: 100,
            max_attempts: 1_000,
        });
        assert_eq!(
            miner.solve(1, "abc", &StopSignal::new()),
            Err(MiningError::AttemptsExhausted { attempts: 1_000 })
        );
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let stop = StopSignal::new();
        let handle = stop.clone();
        handle.cancel();
        assert!(stop.is_cancelled());
    }
}
