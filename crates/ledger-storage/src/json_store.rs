use crate::backend;
use ledger_core::{chain::ChainStore, Block, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILE_PREFIX: &str = "block";
const FILE_SUFFIX: &str = ".json";

/// Stores each block as `<dir>/block{index}.json`. The directory is created on
/// the first save; a missing directory loads as an empty chain.
#[derive(Clone, Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn block_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{index}{FILE_SUFFIX}"))
    }

    /// Block files in the directory, sorted by the index in their name.
    fn block_files(&self) -> Result<Vec<(u64, PathBuf)>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
                continue;
            }
            let index = parse_index(name)
                .ok_or_else(|| StoreError::corrupt(name, "file name has no block index"))?;
            files.push((index, entry.path()));
        }
        files.sort_by_key(|(index, _)| *index);
        // `block7.json` and `block007.json` both parse to index 7.
        if let Some(pair) = files.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(StoreError::corrupt(
                pair[1].1.display(),
                format!("duplicate record for block {}", pair[1].0),
            ));
        }
        Ok(files)
    }
}

fn parse_index(name: &str) -> Option<u64> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

impl ChainStore for JsonDirStore {
    fn load_all(&self) -> Result<Vec<Block>, StoreError> {
        let files = self.block_files()?;
        let mut blocks = Vec::with_capacity(files.len());
        for (index, path) in files {
            let raw = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            let block: Block = serde_json::from_str(&raw)
                .map_err(|e| StoreError::corrupt(path.display(), e))?;
            if block.index != index {
                return Err(StoreError::corrupt(
                    path.display(),
                    format!("file holds block {}", block.index),
                ));
            }
            blocks.push(block);
        }
        debug!(dir = %self.dir.display(), blocks = blocks.len(), "loaded json blocks");
        Ok(blocks)
    }

    fn save(&self, block: &Block) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.block_path(block.index);
        let mut json = serde_json::to_string_pretty(block).map_err(backend)?;
        json.push('\n');
        fs::write(&path, json).map_err(|e| StoreError::io(&path, e))?;
        info!(index = block.index, path = %path.display(), "block saved");
        Ok(())
    }
}
