//! Structural validation of a candidate chain.

use crate::pow::ProofOfWork;
use crate::Block;
use std::fmt;

/// First broken link found in a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainFault {
    /// Zero-based position of the offending block.
    pub position: usize,
    pub kind: FaultKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaultKind {
    PreviousHashMismatch { expected: String, found: String },
    InvalidProof { last_proof: u64, proof: u64 },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::PreviousHashMismatch { expected, found } => write!(
                f,
                "block at {} links to {found}, expected {expected}",
                self.position
            ),
            FaultKind::InvalidProof { last_proof, proof } => write!(
                f,
                "block at {} carries proof {proof} which does not solve last proof {last_proof}",
                self.position
            ),
        }
    }
}

impl std::error::Error for ChainFault {}

#[derive(Clone, Copy, Debug, Default)]
pub struct Validator {
    pow: ProofOfWork,
}

impl Validator {
    pub fn new(pow: ProofOfWork) -> Self {
        Self { pow }
    }

    /// Walk the chain from its first block, which is trusted as-is. Every
    /// later block must link to the hash of its predecessor and carry a proof
    /// solving the predecessor's proof and hash.
    pub fn validate(&self, chain: &[Block]) -> Result<(), ChainFault> {
        for (position, pair) in chain.windows(2).enumerate() {
            let (prior, block) = (&pair[0], &pair[1]);
            let prior_hash = prior.hash();
            if block.previous_hash != prior_hash {
                return Err(ChainFault {
                    position: position + 1,
                    kind: FaultKind::PreviousHashMismatch {
                        expected: prior_hash,
                        found: block.previous_hash.clone(),
                    },
                });
            }
            if !self.pow.valid_proof(prior.proof, block.proof, &prior_hash) {
                return Err(ChainFault {
                    position: position + 1,
                    kind: FaultKind::InvalidProof {
                        last_proof: prior.proof,
                        proof: block.proof,
                    },
                });
            }
        }
        Ok(())
    }

    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        self.validate(chain).is_ok()
    }
}
