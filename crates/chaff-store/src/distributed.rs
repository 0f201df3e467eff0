//! Address-partitioned store over several logical nodes
//!
//! Placement: the node at index `address[0] % nodes`. Lookups do not trust
//! placement (nodes may have been resized or filled by another writer) and
//! ask every node at once, taking the first hit.

use anyhow::Result;
use async_trait::async_trait;
use chaff_chunks::ContentAddress;
use chaff_core::{ChaffError, ChaffResult};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{ChunkStore, MemoryStore};

pub struct DistributedStore {
    nodes: Vec<Arc<dyn ChunkStore>>,
}

impl DistributedStore {
    pub fn new(nodes: Vec<Arc<dyn ChunkStore>>) -> Result<Self> {
        if nodes.is_empty() {
            anyhow::bail!("distributed store needs at least one node");
        }
        Ok(Self { nodes })
    }

    /// `count` independent in-memory nodes.
    pub fn in_memory(count: usize) -> Result<Self> {
        Self::new(
            (0..count)
                .map(|_| Arc::new(MemoryStore::new()) as Arc<dyn ChunkStore>)
                .collect(),
        )
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> Option<&Arc<dyn ChunkStore>> {
        self.nodes.get(index)
    }

    pub fn placement(&self, address: &ContentAddress) -> usize {
        address.as_bytes()[0] as usize % self.nodes.len()
    }
}

#[async_trait]
impl ChunkStore for DistributedStore {
    async fn put(&self, address: &ContentAddress, bytes: &[u8]) -> ChaffResult<()> {
        let index = self.placement(address);
        debug!(address = %address, node = index, "placing entry");
        self.nodes[index].put(address, bytes).await
    }

    async fn get(&self, address: &ContentAddress) -> ChaffResult<Option<Vec<u8>>> {
        let mut lookups: FuturesUnordered<_> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| async move { (i, node.get(address).await) })
            .collect();

        let mut failures = Vec::new();
        while let Some((index, result)) = lookups.next().await {
            match result {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => {}
                Err(e) => {
                    warn!(address = %address, node = index, "node lookup failed: {e}");
                    failures.push(format!("node {index}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(None)
        } else {
            Err(ChaffError::Storage(format!(
                "{address} not found; {} node(s) failed: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}
