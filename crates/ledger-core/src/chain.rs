use crate::constants::{GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
use crate::error::{LedgerError, Result};
use crate::pool::TransactionPool;
use crate::pow::{Miner, StopSignal};
use crate::{now, Amount, Block, Transaction};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trait the storage backends implement for the chain to operate.
/// This lives in `ledger-core` to avoid a circular dependency.
///
/// Positions are zero-based; block `index` n lives at position n - 1.
/// Once `append` returns, `len` and `get` must already reflect it.
pub trait ChainStore: Send + Sync {
    fn get(&self, position: u64) -> anyhow::Result<Option<Block>>;
    /// Store `block` at the next free position and return that position.
    /// Must refuse to overwrite an occupied position.
    fn append(&self, block: &Block) -> anyhow::Result<u64>;
    fn len(&self) -> anyhow::Result<u64>;
    /// Blocks in `[start, end)`, clamped to the stored length.
    fn range(&self, start: u64, end: u64) -> anyhow::Result<Vec<Block>>;
    /// Swap the whole sequence for `blocks` in one step.
    fn replace(&self, blocks: &[Block]) -> anyhow::Result<()>;

    fn last(&self) -> anyhow::Result<Option<Block>> {
        match self.len()? {
            0 => Ok(None),
            len => self.get(len - 1),
        }
    }

    fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Volatile store for tests and `--ephemeral` nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryStore {
    fn get(&self, position: u64) -> anyhow::Result<Option<Block>> {
        let blocks = self.blocks.read();
        Ok(usize::try_from(position)
            .ok()
            .and_then(|p| blocks.get(p))
            .cloned())
    }

    fn append(&self, block: &Block) -> anyhow::Result<u64> {
        let mut blocks = self.blocks.write();
        blocks.push(block.clone());
        Ok(blocks.len() as u64 - 1)
    }

    fn len(&self) -> anyhow::Result<u64> {
        Ok(self.blocks.read().len() as u64)
    }

    fn range(&self, start: u64, end: u64) -> anyhow::Result<Vec<Block>> {
        let blocks = self.blocks.read();
        let end = (end.min(blocks.len() as u64)) as usize;
        let start = (start as usize).min(end);
        Ok(blocks[start..end].to_vec())
    }

    fn replace(&self, blocks: &[Block]) -> anyhow::Result<()> {
        *self.blocks.write() = blocks.to_vec();
        Ok(())
    }
}

/// A store plus its pending pool. One lock serializes every append and
/// replacement.
pub struct Chain<S: ChainStore + ?Sized> {
    store: Arc<S>,
    pool: TransactionPool,
    write_lock: Arc<Mutex<()>>,
}

impl<S: ChainStore + ?Sized> Clone for Chain<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pool: self.pool.clone(),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<S: ChainStore + ?Sized> Chain<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_pool(store, TransactionPool::new())
    }

    pub fn with_pool(store: Arc<S>, pool: TransactionPool) -> Self {
        Self {
            store,
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Ensure a genesis block exists. Idempotent; returns the block when one
    /// was minted.
    pub fn ensure_genesis(&self) -> Result<Option<Block>> {
        let guard = self.write_lock.lock();
        if !self.store.is_empty()? {
            return Ok(None);
        }
        self.forge(&guard, GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string())
            .map(Some)
    }

    pub fn length(&self) -> Result<u64> {
        Ok(self.store.len()?)
    }

    pub fn last_block(&self) -> Result<Block> {
        self.store.last()?.ok_or(LedgerError::EmptyChain)
    }

    /// Block with the given one-based `index`.
    pub fn block(&self, index: u64) -> Result<Option<Block>> {
        match index.checked_sub(1) {
            Some(position) => Ok(self.store.get(position)?),
            None => Ok(None),
        }
    }

    pub fn blocks(&self) -> Result<Vec<Block>> {
        let len = self.store.len()?;
        Ok(self.store.range(0, len)?)
    }

    /// Queue a transaction and return the index of the block that will carry
    /// it. Taken under the write lock so no mint can slip in between.
    pub fn new_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Amount>,
    ) -> Result<u64> {
        let _guard = self.write_lock.lock();
        let last = self.store.last()?.ok_or(LedgerError::EmptyChain)?;
        let tx = Transaction::new(sender, recipient, amount);
        debug!("queued {} -> {} for {}", tx.sender, tx.recipient, tx.amount);
        let pending = self.pool.push(tx);
        debug!("{} transactions pending for block {}", pending, last.index + 1);
        Ok(last.index + 1)
    }

    /// Append a block carrying every pending transaction. Without an explicit
    /// `previous_hash` the block links to the current tip.
    pub fn mint(&self, proof: u64, previous_hash: Option<&str>) -> Result<Block> {
        let guard = self.write_lock.lock();
        let previous_hash = match previous_hash {
            Some(hash) => hash.to_string(),
            None => self.store.last()?.ok_or(LedgerError::EmptyChain)?.hash(),
        };
        self.forge(&guard, proof, previous_hash)
    }

    /// Compare-and-append: mint on top of `expected_tip` only if it is still
    /// the hash of the last block. `None` means the tip moved and nothing was
    /// touched.
    pub fn mint_on(&self, expected_tip: &str, proof: u64) -> Result<Option<Block>> {
        let guard = self.write_lock.lock();
        let tip = self.store.last()?.ok_or(LedgerError::EmptyChain)?.hash();
        if tip != expected_tip {
            return Ok(None);
        }
        self.forge(&guard, proof, tip).map(Some)
    }

    /// Solve the puzzle over the current tip and append. The search runs
    /// without the write lock; a proof made stale by a concurrent mint or
    /// replacement is dropped and the search restarts on the new tip.
    pub fn mine(&self, miner: &Miner, stop: &StopSignal) -> Result<Block> {
        loop {
            let last = self.last_block()?;
            let last_hash = last.hash();
            let proof = miner.solve(last.proof, &last_hash, stop)?;
            if let Some(block) = self.mint_on(&last_hash, proof)? {
                return Ok(block);
            }
            warn!(
                "Chain tip moved while solving over block {}; retrying",
                last.index
            );
        }
    }

    /// Adopt `blocks` if still strictly longer than the local chain.
    pub fn replace_if_longer(&self, blocks: &[Block]) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let local = self.store.len()?;
        if blocks.len() as u64 <= local {
            debug!(
                "Candidate of {} blocks no longer beats local {}",
                blocks.len(),
                local
            );
            return Ok(false);
        }
        self.store.replace(blocks)?;
        info!(
            "Replaced local chain of {} blocks with {} blocks",
            local,
            blocks.len()
        );
        Ok(true)
    }

    // Caller proves it holds the write lock.
    fn forge(&self, _guard: &MutexGuard<'_, ()>, proof: u64, previous_hash: String) -> Result<Block> {
        let index = self.store.len()? + 1;
        let block = Block {
            index,
            timestamp: now(),
            transactions: self.pool.drain(),
            proof,
            previous_hash,
        };
        match self.store.append(&block) {
            Ok(position) => {
                info!(
                    "Forged block {} at position {} with {} transactions",
                    block.index,
                    position,
                    block.transactions.len()
                );
                Ok(block)
            }
            Err(e) => {
                self.pool.requeue(block.transactions);
                Err(e.into())
            }
        }
    }
}
