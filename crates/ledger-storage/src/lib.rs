pub mod json_store;
pub mod sled_store;

use ledger_core::{chain::ChainStore, StoreError};
use std::path::Path;

pub use json_store::JsonDirStore;
pub use sled_store::SledStore;

/// Backend selection for callers that pick a store at runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    /// One pretty-printed `block{index}.json` file per block.
    #[default]
    Json,
    Sled,
}

pub fn open_store<P: AsRef<Path>>(kind: StoreKind, path: P) -> Result<Box<dyn ChainStore>, StoreError> {
    Ok(match kind {
        StoreKind::Json => Box::new(JsonDirStore::new(path.as_ref())),
        StoreKind::Sled => Box::new(SledStore::open(path)?),
    })
}

pub(crate) fn backend<E>(err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::Backend(Box::new(err))
}
