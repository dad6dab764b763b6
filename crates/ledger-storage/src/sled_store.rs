use crate::backend;
use ledger_core::{chain::ChainStore, Block, StoreError};
use sled::{Db, Tree};
use std::path::Path;
use tracing::info;

const TREE_BLOCKS: &str = "blocks";

/// One bincode record per block, keyed by the big-endian index so that
/// iteration order is index order.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  blocks: Tree,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
    let db = sled::open(path).map_err(backend)?;
    let blocks = db.open_tree(TREE_BLOCKS).map_err(backend)?;
    info!("sled store opened");
    Ok(Self { db, blocks })
  }

  pub fn get_block(&self, index: u64) -> Result<Option<Block>, StoreError> {
    self
      .blocks
      .get(index.to_be_bytes())
      .map_err(backend)?
      .map(|bytes| decode(index, &bytes))
      .transpose()
  }

  pub fn close(&self) -> Result<(), StoreError> {
    self.db.flush().map_err(backend)?;
    Ok(())
  }
}

fn decode(index: u64, bytes: &[u8]) -> Result<Block, StoreError> {
  bincode::deserialize(bytes).map_err(|e| StoreError::corrupt(format!("sled block {index}"), e))
}

fn key_index(key: &[u8]) -> Result<u64, StoreError> {
  let arr: [u8; 8] = key
    .try_into()
    .map_err(|_| StoreError::corrupt("sled key", format!("expected 8 bytes, got {}", key.len())))?;
  Ok(u64::from_be_bytes(arr))
}

impl ChainStore for SledStore {
  fn load_all(&self) -> Result<Vec<Block>, StoreError> {
    self
      .blocks
      .iter()
      .map(|entry| {
        let (key, value) = entry.map_err(backend)?;
        decode(key_index(&key)?, &value)
      })
      .collect()
  }

  fn save(&self, block: &Block) -> Result<(), StoreError> {
    let bytes = bincode::serialize(block).map_err(backend)?;
    self
      .blocks
      .insert(block.index.to_be_bytes(), bytes)
      .map_err(backend)?;
    self.db.flush().map_err(backend)?;
    Ok(())
  }
}
