//! OpenDAL-backed chunk store and the store factory used by the daemon

use anyhow::{Context, Result};
use async_trait::async_trait;
use chaff_chunks::ContentAddress;
use chaff_core::config::{StoreBackend, StoreConfig};
use chaff_core::{ChaffError, ChaffResult};
use opendal::Operator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{ChunkStore, DistributedStore, MemoryStore};

/// Stores each entry as one object at `chunks/<hex address>`.
#[derive(Debug, Clone)]
pub struct OperatorStore {
    op: Operator,
}

impl OperatorStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn key(address: &ContentAddress) -> String {
        format!("chunks/{}", address.to_hex())
    }
}

#[async_trait]
impl ChunkStore for OperatorStore {
    async fn put(&self, address: &ContentAddress, bytes: &[u8]) -> ChaffResult<()> {
        let key = Self::key(address);
        if self
            .op
            .exists(&key)
            .await
            .map_err(|e| ChaffError::Storage(format!("stat {key}: {e}")))?
        {
            return Ok(());
        }
        self.op
            .write(&key, bytes.to_vec())
            .await
            .map_err(|e| ChaffError::Storage(format!("writing {key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, address: &ContentAddress) -> ChaffResult<Option<Vec<u8>>> {
        let key = Self::key(address);
        match self.op.read(&key).await {
            Ok(buf) => Ok(Some(buf.to_vec())),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChaffError::Storage(format!("reading {key}: {e}"))),
        }
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

/// Build an OpenDAL operator for one logical node rooted at `root`.
pub fn build_operator(backend: StoreBackend, root: &Path) -> Result<Operator> {
    let op = match backend {
        StoreBackend::Memory => Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish(),
        StoreBackend::Fs => {
            let root = expand_tilde(root);
            let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
            Operator::new(builder)
                .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
                .layer(opendal::layers::LoggingLayer::default())
                .finish()
        }
    };
    Ok(op)
}

/// Build the chunk store described by `[store]`.
///
/// `memory` with one partition is a plain `MemoryStore`. `fs` stores objects
/// under `root`. With `partitions > 1` the address space is spread across that
/// many logical nodes (`root/node-<i>` for `fs`).
pub fn build_store(cfg: &StoreConfig) -> Result<Arc<dyn ChunkStore>> {
    if cfg.partitions == 0 {
        anyhow::bail!("store.partitions must be > 0");
    }

    let node = |i: usize| -> Result<Arc<dyn ChunkStore>> {
        match cfg.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::Fs => {
                let root = if cfg.partitions == 1 {
                    cfg.root.clone()
                } else {
                    cfg.root.join(format!("node-{i}"))
                };
                let op = build_operator(StoreBackend::Fs, &root)?;
                Ok(Arc::new(OperatorStore::new(op)))
            }
        }
    };

    if cfg.partitions == 1 {
        return node(0);
    }
    let nodes = (0..cfg.partitions).map(node).collect::<Result<Vec<_>>>()?;
    let store = DistributedStore::new(nodes).context("building partitioned store")?;
    tracing::info!(
        backend = ?cfg.backend,
        partitions = cfg.partitions,
        "partitioned chunk store ready"
    );
    Ok(Arc::new(store))
}
