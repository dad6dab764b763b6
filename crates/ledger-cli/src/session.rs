use ledger_core::{
    chain::{ChainStore, Ledger, GENESIS_DATA},
    constants::DEFAULT_DIFFICULTY,
    mine::{default_progress_channel, ProgressReceiver},
    Block, CancelToken, LedgerError, Mined, Miner, Verdict, HASH_HEX_SIZE,
};
use std::io::Write;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("difficulty must be a non-negative integer, got {0:?}")]
    InvalidDifficulty(String),
    #[error("difficulty {0} exceeds the length of a hash")]
    DifficultyTooHigh(u64),
}

/// Parses user input for a new difficulty. Rejections never touch session state.
pub fn parse_difficulty(input: &str) -> Result<u32, ConfigError> {
    let trimmed = input.trim();
    let value: u64 = trimmed
        .parse()
        .map_err(|_| ConfigError::InvalidDifficulty(trimmed.to_string()))?;
    if value > HASH_HEX_SIZE as u64 {
        return Err(ConfigError::DifficultyTooHigh(value));
    }
    Ok(value as u32)
}

/// Owns the ledger, the miner and the difficulty used for the next block.
pub struct Session<S: ChainStore> {
    ledger: Ledger<S>,
    miner: Miner,
    difficulty: u32,
    show_progress: bool,
}

impl<S: ChainStore> Session<S> {
    /// Loads the chain. Without an explicit difficulty the session continues at
    /// the last block's difficulty, or the default for an empty chain.
    pub fn open(store: S, miner: Miner, difficulty: Option<u32>) -> Result<Self, LedgerError> {
        let ledger = Ledger::open(store)?;
        let difficulty = difficulty.unwrap_or_else(|| ledger.current_difficulty(DEFAULT_DIFFICULTY));
        Ok(Self {
            ledger,
            miner,
            difficulty,
            show_progress: true,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, input: &str) -> Result<u32, ConfigError> {
        let difficulty = parse_difficulty(input)?;
        info!(from = self.difficulty, to = difficulty, "difficulty changed");
        self.difficulty = difficulty;
        Ok(difficulty)
    }

    pub fn blocks(&self) -> &[Block] {
        self.ledger.blocks()
    }

    /// Mines the genesis block at the session difficulty when the chain is empty.
    pub fn ensure_genesis(&mut self) -> Result<Option<Mined>, LedgerError> {
        if !self.ledger.is_empty() {
            return Ok(None);
        }
        self.append(GENESIS_DATA).map(Some)
    }

    /// Mines `data` on the tip at the session difficulty, appends and saves it.
    pub fn mine_block(&mut self, data: &str) -> Result<Mined, LedgerError> {
        self.append(data)
    }

    /// Whether the last mined block is still waiting to be saved.
    pub fn has_unsaved_block(&self) -> bool {
        self.ledger.has_unsaved_tip()
    }

    /// Retries saving the last mined block.
    pub fn retry_save(&mut self) -> Result<(), LedgerError> {
        self.ledger.persist_tip()
    }

    /// Drops the last mined block if it was never saved.
    pub fn discard_unsaved(&mut self) -> Option<Block> {
        self.ledger.discard_unsaved_tip()
    }

    fn append(&mut self, data: &str) -> Result<Mined, LedgerError> {
        info!(
            difficulty = self.difficulty,
            workers = self.miner.config().workers,
            "mining"
        );
        let cancel = CancelToken::new();
        if !self.show_progress {
            return self
                .ledger
                .append(&self.miner, data, self.difficulty, None, &cancel);
        }
        let (tx, rx) = default_progress_channel();
        let monitor = spawn_monitor(rx);
        let result = self
            .ledger
            .append(&self.miner, data, self.difficulty, Some(tx), &cancel);
        // The monitor ends once `append` has dropped every progress sender.
        if monitor.join().is_err() {
            warn!("progress monitor panicked");
        }
        result
    }

    pub fn validate(&self) -> Verdict {
        self.ledger.validate()
    }
}

/// Prints the nonce high-water mark on a single stderr line until the search ends.
fn spawn_monitor(rx: ProgressReceiver) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut stderr = std::io::stderr();
        let mut printed = false;
        for nonce in rx {
            let _ = write!(stderr, "\rNonce being checked: {nonce}");
            let _ = stderr.flush();
            printed = true;
        }
        if printed {
            let _ = writeln!(stderr);
        }
    })
}
