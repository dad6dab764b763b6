pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// `previous_hash` of the genesis block: one '0' per hex character of a real digest.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

pub const DEFAULT_DIFFICULTY: u32 = 5;

/// Attempts a worker makes between progress reports.
pub const PROGRESS_INTERVAL: u64 = 100_000;
/// Capacity of the progress channel; reports beyond it are dropped.
pub const PROGRESS_BUFFER: usize = 100;
