use crate::{
    mine::{CancelToken, Mined, Miner, ProgressSender},
    validate::{validate, Verdict},
    Block, Candidate, LedgerError, StoreError,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Trait the storage backends implement for the ledger to persist blocks.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// Every persisted block, ascending by index. Empty when nothing was saved.
    fn load_all(&self) -> Result<Vec<Block>, StoreError>;
    /// Persist one finalized block, keyed by its index.
    fn save(&self, block: &Block) -> Result<(), StoreError>;
}

impl<S: ChainStore + ?Sized> ChainStore for Arc<S> {
    fn load_all(&self) -> Result<Vec<Block>, StoreError> {
        (**self).load_all()
    }

    fn save(&self, block: &Block) -> Result<(), StoreError> {
        (**self).save(block)
    }
}

impl<S: ChainStore + ?Sized> ChainStore for Box<S> {
    fn load_all(&self) -> Result<Vec<Block>, StoreError> {
        (**self).load_all()
    }

    fn save(&self, block: &Block) -> Result<(), StoreError> {
        (**self).save(block)
    }
}

pub const GENESIS_DATA: &str = "Genesis Block";

/// In-memory chain backed by a `ChainStore`. Loaded once, then only appended to.
///
/// At most one block, the tip, can be held in memory without having been
/// saved. No block is mined on top of it until it is saved or discarded.
pub struct Ledger<S: ChainStore> {
    store: S,
    blocks: Vec<Block>,
    unsaved_tip: bool,
}

impl<S: ChainStore> Ledger<S> {
    pub fn open(store: S) -> Result<Self, LedgerError> {
        let blocks = store.load_all().map_err(LedgerError::Load)?;
        info!(blocks = blocks.len(), "ledger loaded");
        Ok(Self {
            store,
            blocks,
            unsaved_tip: false,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Difficulty of the last block, or `default` for an empty chain.
    pub fn current_difficulty(&self, default: u32) -> u32 {
        self.tip().map_or(default, |b| b.difficulty)
    }

    /// Mine and persist a genesis block if the chain is empty. Idempotent.
    pub fn ensure_genesis(&mut self, miner: &Miner, difficulty: u32) -> Result<Option<Mined>, LedgerError> {
        if !self.blocks.is_empty() {
            return Ok(None);
        }
        self.append(miner, GENESIS_DATA, difficulty, None, &CancelToken::new())
            .map(Some)
    }

    /// Mine a block on the current tip, append it, then save it.
    ///
    /// A save failure leaves the mined block in memory and returns
    /// `LedgerError::Unsaved`; `persist_tip` retries the save and
    /// `discard_unsaved_tip` drops the block. While the tip is unsaved, `append`
    /// first retries its save and mines nothing if that fails again, so the
    /// store never holds a gap.
    pub fn append(
        &mut self,
        miner: &Miner,
        data: &str,
        difficulty: u32,
        progress: Option<ProgressSender>,
        cancel: &CancelToken,
    ) -> Result<Mined, LedgerError> {
        if self.unsaved_tip {
            self.persist_tip()?;
        }
        let candidate = Candidate::next(self.tip(), data, difficulty);
        let mined = miner.mine(candidate, progress, cancel)?;
        self.blocks.push(mined.block.clone());
        self.unsaved_tip = true;
        self.persist_tip()?;
        Ok(mined)
    }

    /// Whether the tip was mined but its save failed.
    pub fn has_unsaved_tip(&self) -> bool {
        self.unsaved_tip
    }

    /// Save the tip block again.
    pub fn persist_tip(&mut self) -> Result<(), LedgerError> {
        let tip = self.blocks.last().ok_or(LedgerError::Empty)?;
        self.store.save(tip).map_err(|source| {
            warn!(index = tip.index, error = %source, "mined block not saved");
            LedgerError::Unsaved {
                index: tip.index,
                source,
            }
        })?;
        self.unsaved_tip = false;
        Ok(())
    }

    /// Drop the tip if its save failed. Returns the dropped block.
    pub fn discard_unsaved_tip(&mut self) -> Option<Block> {
        if !self.unsaved_tip {
            return None;
        }
        self.unsaved_tip = false;
        let block = self.blocks.pop()?;
        warn!(index = block.index, "unsaved block discarded");
        Some(block)
    }

    pub fn validate(&self) -> Verdict {
        validate(&self.blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MinerConfig, GENESIS_PREVIOUS_HASH};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        blocks: Mutex<Vec<Block>>,
        fail_saves: AtomicBool,
    }

    impl ChainStore for MemoryStore {
        fn load_all(&self) -> Result<Vec<Block>, StoreError> {
            Ok(self.blocks.lock().unwrap().clone())
        }

        fn save(&self, block: &Block) -> Result<(), StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("disk full".into()));
            }
            self.blocks.lock().unwrap().push(block.clone());
            Ok(())
        }
    }

    fn miner() -> Miner {
        Miner::new(MinerConfig::default().with_workers(2))
    }

    #[test]
    fn ensure_genesis_is_idempotent() {
        let mut ledger = Ledger::open(MemoryStore::default()).unwrap();
        let first = ledger.ensure_genesis(&miner(), 1).unwrap();
        assert!(first.is_some());
        assert!(ledger.ensure_genesis(&miner(), 1).unwrap().is_none());
        assert_eq!(ledger.len(), 1);

        let genesis = &ledger.blocks()[0];
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.data, GENESIS_DATA);
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
    }

    #[test]
    fn append_links_persists_and_validates() {
        let store = Arc::new(MemoryStore::default());
        let mut ledger = Ledger::open(store.clone()).unwrap();
        ledger.ensure_genesis(&miner(), 1).unwrap();
        for data in ["a", "b", "c"] {
            ledger
                .append(&miner(), data, 2, None, &CancelToken::new())
                .unwrap();
        }
        assert_eq!(ledger.len(), 4);
        assert!(ledger.validate().is_valid());
        assert_eq!(ledger.current_difficulty(5), 2);
        assert_eq!(store.load_all().unwrap(), ledger.blocks());

        let reopened = Ledger::open(store).unwrap();
        assert_eq!(reopened.blocks(), ledger.blocks());
    }

    #[test]
    fn difficulty_can_change_between_blocks() {
        let mut ledger = Ledger::open(MemoryStore::default()).unwrap();
        ledger.ensure_genesis(&miner(), 2).unwrap();
        ledger
            .append(&miner(), "easier", 0, None, &CancelToken::new())
            .unwrap();
        ledger
            .append(&miner(), "harder", 3, None, &CancelToken::new())
            .unwrap();
        let difficulties: Vec<u32> = ledger.blocks().iter().map(|b| b.difficulty).collect();
        assert_eq!(difficulties, vec![2, 0, 3]);
        assert!(ledger.validate().is_valid());
    }

    #[test]
    fn failed_save_keeps_block_in_memory() {
        let store = Arc::new(MemoryStore::default());
        let mut ledger = Ledger::open(store.clone()).unwrap();
        ledger.ensure_genesis(&miner(), 0).unwrap();

        store.fail_saves.store(true, Ordering::SeqCst);
        let err = ledger
            .append(&miner(), "unsaved", 0, None, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unsaved { index: 1, .. }));
        assert_eq!(ledger.len(), 2);
        assert_eq!(store.load_all().unwrap().len(), 1);

        store.fail_saves.store(false, Ordering::SeqCst);
        ledger.persist_tip().unwrap();
        assert!(!ledger.has_unsaved_tip());
        assert_eq!(store.load_all().unwrap(), ledger.blocks());
    }

    #[test]
    fn nothing_is_mined_on_an_unsaved_tip() {
        let store = Arc::new(MemoryStore::default());
        let mut ledger = Ledger::open(store.clone()).unwrap();
        ledger.ensure_genesis(&miner(), 0).unwrap();

        store.fail_saves.store(true, Ordering::SeqCst);
        assert!(ledger
            .append(&miner(), "first", 0, None, &CancelToken::new())
            .is_err());
        assert!(ledger.has_unsaved_tip());

        // Still failing: the pending tip blocks the next block.
        let err = ledger
            .append(&miner(), "second", 0, None, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unsaved { index: 1, .. }));
        assert_eq!(ledger.len(), 2);

        // Once the store recovers, the next append saves the pending tip first.
        store.fail_saves.store(false, Ordering::SeqCst);
        ledger
            .append(&miner(), "second", 0, None, &CancelToken::new())
            .unwrap();
        let indexes: Vec<u64> = store.load_all().unwrap().iter().map(|b| b.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(validate(&store.load_all().unwrap()).is_valid());
        assert!(ledger.validate().is_valid());
    }

    #[test]
    fn discarded_tip_is_not_persisted() {
        let store = Arc::new(MemoryStore::default());
        let mut ledger = Ledger::open(store.clone()).unwrap();
        ledger.ensure_genesis(&miner(), 0).unwrap();
        assert!(ledger.discard_unsaved_tip().is_none());

        store.fail_saves.store(true, Ordering::SeqCst);
        assert!(ledger
            .append(&miner(), "lost", 0, None, &CancelToken::new())
            .is_err());
        let dropped = ledger.discard_unsaved_tip().unwrap();
        assert_eq!(dropped.data, "lost");
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.has_unsaved_tip());

        store.fail_saves.store(false, Ordering::SeqCst);
        let mined = ledger
            .append(&miner(), "kept", 0, None, &CancelToken::new())
            .unwrap();
        assert_eq!(mined.block.index, 1);
        assert_eq!(store.load_all().unwrap(), ledger.blocks());
    }

    #[test]
    fn current_difficulty_defaults_on_empty_chain() {
        let mut ledger = Ledger::open(MemoryStore::default()).unwrap();
        assert_eq!(ledger.current_difficulty(5), 5);
        assert!(matches!(ledger.persist_tip(), Err(LedgerError::Empty)));
        assert!(ledger.validate().is_valid());
    }
}
