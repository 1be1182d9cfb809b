use anyhow::{bail, Context, Result};
use ledger_core::{Block, ChainStore};
use sled::{Batch, Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";

/// Blocks keyed by big-endian position, so key order is chain order and the
/// last key gives the length.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled at {}", path.display()))?;
    let blocks = db.open_tree(TREE_BLOCKS)?;
    info!("sled store opened at {}", path.display());
    Ok(Self { db, blocks })
  }

  pub fn flush(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}

fn key(position: u64) -> [u8; 8] {
  position.to_be_bytes()
}

fn position_of(key: &IVec) -> Result<u64> {
  let bytes: [u8; 8] = key
    .as_ref()
    .try_into()
    .with_context(|| format!("malformed block key of {} bytes", key.len()))?;
  Ok(u64::from_be_bytes(bytes))
}

fn decode(position: u64, bytes: &IVec) -> Result<Block> {
  bincode::deserialize(bytes).with_context(|| format!("decoding block at position {position}"))
}

impl ChainStore for SledStore {
  fn get(&self, position: u64) -> Result<Option<Block>> {
    self
      .blocks
      .get(key(position))?
      .map(|bytes| decode(position, &bytes))
      .transpose()
  }

  fn append(&self, block: &Block) -> Result<u64> {
    let position = self.len()?;
    let bytes = bincode::serialize(block)?;
    // never overwrite: the slot must still be empty
    if self
      .blocks
      .compare_and_swap(key(position), None as Option<&[u8]>, Some(bytes))?
      .is_err()
    {
      bail!("position {position} already occupied");
    }
    self.db.flush()?;
    debug!("appended block {} at position {}", block.index, position);
    Ok(position)
  }

  fn len(&self) -> Result<u64> {
    match self.blocks.last()? {
      Some((k, _)) => Ok(position_of(&k)? + 1),
      None => Ok(0),
    }
  }

  fn range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
    let end = end.min(self.len()?);
    if start >= end {
      return Ok(Vec::new());
    }
    self
      .blocks
      .range(key(start)..key(end))
      .map(|entry| {
        let (k, bytes) = entry?;
        decode(position_of(&k)?, &bytes)
      })
      .collect()
  }

  fn replace(&self, blocks: &[Block]) -> Result<()> {
    let existing = self.len()?;
    let mut batch = Batch::default();
    for position in blocks.len() as u64..existing {
      batch.remove(&key(position)[..]);
    }
    for (position, block) in blocks.iter().enumerate() {
      batch.insert(&key(position as u64)[..], bincode::serialize(block)?);
    }
    self.blocks.apply_batch(batch)?;
    self.db.flush()?;
    info!("replaced {} stored blocks with {}", existing, blocks.len());
    Ok(())
  }
}
