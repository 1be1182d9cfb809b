//! Pending transactions waiting for the next block.

use crate::Transaction;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared mempool. Clones refer to the same buffer; every operation takes the
/// one lock, so concurrent pushes are never lost and a drain never splits.
#[derive(Clone, Debug, Default)]
pub struct TransactionPool {
    pending: Arc<Mutex<Vec<Transaction>>>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transaction; returns how many are now pending.
    pub fn push(&self, tx: Transaction) -> usize {
        let mut pending = self.pending.lock();
        pending.push(tx);
        pending.len()
    }

    /// Take everything, leaving the pool empty.
    pub fn drain(&self) -> Vec<Transaction> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Put a drained batch back ahead of anything queued since.
    pub fn requeue(&self, mut batch: Vec<Transaction>) {
        let mut pending = self.pending.lock();
        batch.append(&mut pending);
        *pending = batch;
    }

    pub fn snapshot(&self) -> Vec<Transaction> {
        self.pending.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
