//! chaff-store: content-addressed chunk storage
//!
//! A `ChunkStore` maps a `ContentAddress` to the ciphertext stored under it.
//! Entries are write-once, read-many: writing an address that already exists
//! is a no-op, since the address is a hash of the bytes.
//!
//! None of the stores evict. An entry written once stays until the backing
//! storage is discarded (process exit for `MemoryStore`, the directory for an
//! `fs`-backed `OperatorStore`). Operators sizing long-lived nodes must plan
//! for unbounded growth.

pub mod distributed;
pub mod memory;
pub mod operator;

use async_trait::async_trait;
use chaff_chunks::ContentAddress;
use chaff_core::ChaffResult;

pub use distributed::DistributedStore;
pub use memory::MemoryStore;
pub use operator::{build_operator, build_store, OperatorStore};

/// Shared by all concurrent resolution tasks; implementations must allow
/// concurrent reads and concurrent writes.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store `bytes` under `address`. Existing entries are left untouched.
    async fn put(&self, address: &ContentAddress, bytes: &[u8]) -> ChaffResult<()>;

    /// Fetch the entry under `address`, `None` if absent.
    async fn get(&self, address: &ContentAddress) -> ChaffResult<Option<Vec<u8>>>;

    async fn contains(&self, address: &ContentAddress) -> ChaffResult<bool> {
        Ok(self.get(address).await?.is_some())
    }

    /// Write entries in the given order, stopping at the first failure.
    async fn put_entries(&self, entries: &[(&ContentAddress, &[u8])]) -> ChaffResult<()> {
        for (address, bytes) in entries {
            self.put(address, bytes).await?;
        }
        Ok(())
    }
}
