use crate::{pow::meets_difficulty, Block, GENESIS_PREVIOUS_HASH};
use std::fmt;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Stored hash differs from the recomputed one.
    HashMismatch,
    /// Hash has fewer leading '0' characters than the block's difficulty.
    DifficultyNotMet,
    /// `previous_hash` differs from the predecessor's hash.
    BrokenLink,
    /// Genesis `previous_hash` is not the all-zero sentinel.
    BadGenesisLink,
    /// `index` differs from the block's position in the chain.
    IndexGap,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Fault::HashMismatch => "invalid hash",
            Fault::DifficultyNotMet => "does not meet difficulty requirements",
            Fault::BrokenLink => "previous hash mismatch",
            Fault::BadGenesisLink => "invalid previous hash for genesis block",
            Fault::IndexGap => "index out of sequence",
        };
        f.write_str(msg)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid {
        position: usize,
        index: u64,
        fault: Fault,
    },
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Valid => f.write_str("chain is valid"),
            Verdict::Invalid { index, fault, .. } => write!(f, "block {index}: {fault}"),
        }
    }
}

/// Checks one block against its predecessor (`None` for the genesis position).
pub fn check_block(block: &Block, previous: Option<&Block>) -> Option<Fault> {
    if block.hash != block.compute_hash() {
        return Some(Fault::HashMismatch);
    }
    if !meets_difficulty(&block.hash, block.difficulty) {
        return Some(Fault::DifficultyNotMet);
    }
    match previous {
        Some(prev) if block.previous_hash != prev.hash => Some(Fault::BrokenLink),
        None if block.previous_hash != GENESIS_PREVIOUS_HASH => Some(Fault::BadGenesisLink),
        _ => None,
    }
}

/// Walks the chain in order and stops at the first faulty block.
/// An empty chain is valid.
pub fn validate(chain: &[Block]) -> Verdict {
    for (position, block) in chain.iter().enumerate() {
        let previous = position.checked_sub(1).map(|p| &chain[p]);
        let fault = check_block(block, previous)
            .or_else(|| (block.index != position as u64).then_some(Fault::IndexGap));
        if let Some(fault) = fault {
            warn!(position, index = block.index, %fault, "chain validation failed");
            return Verdict::Invalid {
                position,
                index: block.index,
                fault,
            };
        }
    }
    Verdict::Valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Candidate, CancelToken, Miner, MinerConfig};

    fn build_chain(len: usize, difficulty: u32) -> Vec<Block> {
        let miner = Miner::new(MinerConfig::default().with_workers(2));
        let mut chain: Vec<Block> = Vec::new();
        for i in 0..len {
            let candidate = Candidate::next(chain.last(), format!("block {i}"), difficulty);
            let mined = miner.mine(candidate, None, &CancelToken::new()).unwrap();
            chain.push(mined.block);
        }
        chain
    }

    fn invalid_at(verdict: &Verdict) -> (usize, Fault) {
        match verdict {
            Verdict::Invalid {
                position, fault, ..
            } => (*position, *fault),
            Verdict::Valid => panic!("expected an invalid chain"),
        }
    }

    #[test]
    fn empty_chain_is_valid() {
        assert!(validate(&[]).is_valid());
    }

    #[test]
    fn mined_chain_is_valid() {
        let chain = build_chain(5, 2);
        assert_eq!(validate(&chain), Verdict::Valid);
    }

    #[test]
    fn tampered_data_is_hash_mismatch() {
        let mut chain = build_chain(4, 1);
        chain[2].data.push('!');
        assert_eq!(invalid_at(&validate(&chain)), (2, Fault::HashMismatch));
    }

    #[test]
    fn tampered_hash_is_detected_at_or_before_block() {
        let mut chain = build_chain(4, 1);
        chain[1].hash = chain[1].hash.replacen('0', "1", 1);
        let (position, fault) = invalid_at(&validate(&chain));
        assert_eq!(position, 1);
        assert_eq!(fault, Fault::HashMismatch);
    }

    #[test]
    fn raised_difficulty_is_detected() {
        let mut chain = build_chain(3, 1);
        let zeros = crate::pow::leading_zero_chars(&chain[1].hash) as u32;
        chain[1].difficulty = zeros + 1;
        assert_eq!(invalid_at(&validate(&chain)), (1, Fault::DifficultyNotMet));
    }

    #[test]
    fn resealed_block_breaks_link() {
        let mut chain = build_chain(3, 0);
        let mut candidate = Candidate::next(Some(&chain[0]), "other", 0);
        candidate.previous_hash = "f".repeat(64);
        chain[1] = candidate.seal(0);
        assert_eq!(invalid_at(&validate(&chain)), (1, Fault::BrokenLink));
    }

    #[test]
    fn genesis_requires_exact_sentinel() {
        let mut candidate = Candidate::genesis("Genesis Block", 0);
        assert!(validate(&[candidate.seal(0)]).is_valid());

        candidate.previous_hash = "0".repeat(68);
        let verdict = validate(&[candidate.seal(0)]);
        assert_eq!(invalid_at(&verdict), (0, Fault::BadGenesisLink));

        candidate.previous_hash = String::new();
        let verdict = validate(&[candidate.seal(0)]);
        assert_eq!(invalid_at(&verdict), (0, Fault::BadGenesisLink));
    }

    #[test]
    fn index_out_of_sequence_is_detected() {
        let chain = build_chain(1, 0);
        let mut candidate = Candidate::following(&chain[0], "skip", 0);
        candidate.index = 5;
        let mut chain = chain;
        chain.push(candidate.seal(0));
        assert_eq!(invalid_at(&validate(&chain)), (1, Fault::IndexGap));
    }

    #[test]
    fn verdict_display() {
        let verdict = Verdict::Invalid {
            position: 3,
            index: 3,
            fault: Fault::BrokenLink,
        };
        assert_eq!(verdict.to_string(), "block 3: previous hash mismatch");
        assert_eq!(Verdict::Valid.to_string(), "chain is valid");
    }
}
