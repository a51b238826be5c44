//! Composition store: named save/load/list/delete over opaque buffers
//!
//! The engine never looks inside the buffers it exchanges here; encoding
//! and decoding belong to the serializer. Store failures are returned to
//! the caller unchanged, with no retry.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Store index is corrupt: {0}")]
    Index(#[from] serde_json::Error),
    #[error("No composition with id {0}")]
    NotFound(u64),
}

/// A saved composition's id and display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub id: u64,
    pub name: String,
}

/// Save/load/list/delete surface the composer talks to
pub trait CompositionStore {
    fn list(&self) -> Result<Vec<StoreEntry>, StoreError>;
    fn save(&mut self, name: &str, data: &[u8]) -> Result<u64, StoreError>;
    fn load(&self, id: u64) -> Result<Vec<u8>, StoreError>;
    fn delete(&mut self, id: u64) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    next_id: u64,
    names: BTreeMap<u64, String>,
}

/// Directory-backed store: one `<id>.bbc` buffer per composition plus a
/// JSON index of names.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn buffer_path(&self, id: u64) -> PathBuf {
        self.root.join(format!("{id}.bbc"))
    }

    fn read_index(&self) -> Result<Index, StoreError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Index {
                next_id: 1,
                names: BTreeMap::new(),
            });
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_index(&self, index: &Index) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(index)?;
        fs::write(self.index_path(), text)?;
        Ok(())
    }
}

impl CompositionStore for FsStore {
    fn list(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let index = self.read_index()?;
        Ok(index
            .names
            .into_iter()
            .map(|(id, name)| StoreEntry { id, name })
            .collect())
    }

    fn save(&mut self, name: &str, data: &[u8]) -> Result<u64, StoreError> {
        let mut index = self.read_index()?;
        let id = index.next_id;
        index.next_id += 1;
        index.names.insert(id, name.to_string());

        fs::write(self.buffer_path(id), data)?;
        self.write_index(&index)?;
        info!(id, name, bytes = data.len(), "Saved composition");
        Ok(id)
    }

    fn load(&self, id: u64) -> Result<Vec<u8>, StoreError> {
        let index = self.read_index()?;
        if !index.names.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        Ok(fs::read(self.buffer_path(id))?)
    }

    fn delete(&mut self, id: u64) -> Result<(), StoreError> {
        let mut index = self.read_index()?;
        if index.names.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.write_index(&index)?;

        let path = self.buffer_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        info!(id, "Deleted composition");
        Ok(())
    }
}
