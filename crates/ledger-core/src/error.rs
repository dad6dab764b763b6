use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MineError {
    #[error("nonce space exhausted after {attempts} attempts without a hash meeting difficulty {difficulty}")]
    Exhausted { difficulty: u32, attempts: u64 },
    #[error("mining cancelled before a block was found")]
    Cancelled,
    #[error("difficulty {difficulty} is unreachable, a hash has only {max} characters")]
    Unreachable { difficulty: u32, max: usize },
    #[error("could not start mining workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt block record {location}: {reason}")]
    Corrupt { location: String, reason: String },
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(location: impl ToString, reason: impl ToString) -> Self {
        Self::Corrupt {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Mine(#[from] MineError),
    #[error("failed to load chain: {0}")]
    Load(#[source] StoreError),
    /// The block was mined and appended in memory but not persisted.
    #[error("block {index} was mined but not saved: {source}")]
    Unsaved {
        index: u64,
        #[source]
        source: StoreError,
    },
    #[error("chain is empty")]
    Empty,
}
