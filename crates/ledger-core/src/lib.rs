pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;
pub mod validate;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use constants::{GENESIS_PREVIOUS_HASH, HASH_HEX_SIZE};
pub use error::{LedgerError, MineError, StoreError};
pub use mine::{mine, CancelToken, Mined, Miner, MinerConfig};
pub use validate::{validate, Fault, Verdict};

/// SHA-256 over the canonical record `index ‖ timestamp ‖ data ‖ nonce ‖ previous_hash`,
/// hex-encoded lowercase.
pub fn block_hash(index: u64, timestamp: &str, data: &str, nonce: u64, previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string().as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(data.as_bytes());
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// A finalized block. Only the miner, deserialization and tests build these;
/// the pre-hash state lives in [`Candidate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub data: String,
    pub nonce: u64,
    pub hash: String,
    pub previous_hash: String,
    pub difficulty: u32,
}

impl Block {
    /// Recompute the hash from the block's own fields.
    pub fn compute_hash(&self) -> String {
        block_hash(
            self.index,
            &self.timestamp,
            &self.data,
            self.nonce,
            &self.previous_hash,
        )
    }
}

/// Everything of a block except its nonce and hash. The timestamp is fixed when
/// the candidate is built, so every attempt in one search hashes the same record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub index: u64,
    pub timestamp: String,
    pub data: String,
    pub previous_hash: String,
    pub difficulty: u32,
}

impl Candidate {
    pub fn genesis(data: impl Into<String>, difficulty: u32) -> Self {
        Self {
            index: 0,
            timestamp: now_rfc3339(),
            data: data.into(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            difficulty,
        }
    }

    /// The index saturates at `u64::MAX`; the validator rejects the repeated
    /// index that produces.
    pub fn following(previous: &Block, data: impl Into<String>, difficulty: u32) -> Self {
        Self {
            index: previous.index.saturating_add(1),
            timestamp: now_rfc3339(),
            data: data.into(),
            previous_hash: previous.hash.clone(),
            difficulty,
        }
    }

    /// Genesis when there is no predecessor, otherwise the block after `previous`.
    pub fn next(previous: Option<&Block>, data: impl Into<String>, difficulty: u32) -> Self {
        match previous {
            Some(prev) => Self::following(prev, data, difficulty),
            None => Self::genesis(data, difficulty),
        }
    }

    pub fn hash_with(&self, nonce: u64) -> String {
        block_hash(
            self.index,
            &self.timestamp,
            &self.data,
            nonce,
            &self.previous_hash,
        )
    }

    /// Finalize with a nonce and its already computed hash.
    pub(crate) fn seal_with_hash(&self, nonce: u64, hash: String) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp.clone(),
            data: self.data.clone(),
            nonce,
            hash,
            previous_hash: self.previous_hash.clone(),
            difficulty: self.difficulty,
        }
    }

    pub fn seal(&self, nonce: u64) -> Block {
        self.seal_with_hash(nonce, self.hash_with(nonce))
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub mod pow {
    /// Number of leading '0' characters of a hex hash.
    pub fn leading_zero_chars(hash: &str) -> usize {
        hash.bytes().take_while(|b| *b == b'0').count()
    }

    /// True when the first `difficulty` characters of `hash` are all '0'.
    pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
        let difficulty = difficulty as usize;
        hash.len() >= difficulty && hash.as_bytes()[..difficulty].iter().all(|b| *b == b'0')
    }
}
