//! Process-local chunk store

use async_trait::async_trait;
use chaff_chunks::ContentAddress;
use chaff_core::{ChaffError, ChaffResult};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::ChunkStore;

/// In-memory store. Reads proceed concurrently; writes take the lock briefly.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<ContentAddress, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop an entry. Used to simulate loss in tests and tooling; the
    /// store itself never removes entries.
    pub fn remove(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        self.entries.write().ok()?.remove(address)
    }

    /// Overwrite an entry in place, bypassing write-once semantics.
    pub fn replace(&self, address: &ContentAddress, bytes: Vec<u8>) -> ChaffResult<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(*address, bytes);
        Ok(())
    }
}

fn poisoned() -> ChaffError {
    ChaffError::Storage("memory store lock poisoned".into())
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn put(&self, address: &ContentAddress, bytes: &[u8]) -> ChaffResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.entry(*address).or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    async fn get(&self, address: &ContentAddress) -> ChaffResult<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(address).cloned())
    }

    async fn contains(&self, address: &ContentAddress) -> ChaffResult<bool> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.contains_key(address))
    }
}
