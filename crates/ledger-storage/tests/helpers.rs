#![allow(dead_code)]

use ledger_core::{Block, Candidate, CancelToken, Miner, MinerConfig};
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

pub fn create_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

/// Directory path inside a fresh temp dir that does not exist yet.
pub fn missing_subdir() -> (TempDir, PathBuf) {
    let (temp_dir, path) = create_temp_dir();
    (temp_dir, path.join("blocks"))
}

/// A valid chain of `len` blocks mined at `difficulty`.
pub fn mine_chain(len: usize, difficulty: u32) -> Vec<Block> {
    let miner = Miner::new(MinerConfig::default().with_workers(2));
    let mut chain: Vec<Block> = Vec::with_capacity(len);
    for i in 0..len {
        let candidate = Candidate::next(chain.last(), format!("payload {i}"), difficulty);
        let mined = miner
            .mine(candidate, None, &CancelToken::new())
            .expect("mining at low difficulty succeeds");
        chain.push(mined.block);
    }
    chain
}
