//! Concurrent resolution of manifest addresses
//!
//! For each real address, one task: local store → peers in directory order
//! (each bounded by `peer_timeout`) → cache-fill on a peer hit. Decoy
//! addresses go through the same lookup in detached tasks so the request
//! pattern on the wire does not separate real from decoy; `resolve` never
//! waits for them.
//!
//! Lookups of one address are serialised through an in-flight table. A task
//! that waited re-checks the local store before touching the network, so a
//! burst of resolutions for one address costs a single peer round-trip.

use async_trait::async_trait;
use chaff_chunks::ContentAddress;
use chaff_core::config::RetrievalConfig;
use chaff_core::{ChaffError, ChaffResult, PeerEndpoint};
use chaff_crypto::Manifest;
use chaff_store::ChunkStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as TokioMutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::peers::PeerDirectory;

/// Data-channel seam: ask one peer for one address.
#[async_trait]
pub trait PeerFetcher: Send + Sync {
    /// `Ok(None)` when the peer answered but does not hold the entry.
    async fn fetch(
        &self,
        peer: &PeerEndpoint,
        address: &ContentAddress,
    ) -> ChaffResult<Option<Vec<u8>>>;
}

/// Outcome of resolving every real address of a manifest.
#[derive(Debug, Default)]
pub struct Resolution {
    pub found: HashMap<ContentAddress, Vec<u8>>,
    /// Addresses neither held locally nor by any peer, in manifest order
    pub unresolved: Vec<ContentAddress>,
    /// Entries obtained from a peer (and cached locally)
    pub peer_hits: usize,
    /// Decoy queries started in the background
    pub decoys_issued: usize,
    peers_tried: usize,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn get(&self, address: &ContentAddress) -> Option<&[u8]> {
        self.found.get(address).map(Vec::as_slice)
    }

    /// The resolved entries, or `ChunkUnresolved` for the first missing
    /// address in manifest order.
    pub fn into_result(self) -> ChaffResult<HashMap<ContentAddress, Vec<u8>>> {
        match self.unresolved.first() {
            Some(address) => Err(ChaffError::ChunkUnresolved {
                address: address.to_hex(),
                peers_tried: self.peers_tried,
            }),
            None => Ok(self.found),
        }
    }
}

enum Lookup {
    Local(Vec<u8>),
    Peer(Vec<u8>),
    Missing,
}

type Slot = Arc<TokioMutex<()>>;

struct Inner {
    store: Arc<dyn ChunkStore>,
    peers: PeerDirectory,
    fetcher: Arc<dyn PeerFetcher>,
    config: RetrievalConfig,
    real_permits: Arc<Semaphore>,
    decoy_permits: Arc<Semaphore>,
    in_flight: Mutex<HashMap<ContentAddress, Slot>>,
}

/// Cheap to clone; clones share the store, limits and in-flight table.
#[derive(Clone)]
pub struct RetrievalEngine {
    inner: Arc<Inner>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        peers: PeerDirectory,
        fetcher: Arc<dyn PeerFetcher>,
        config: RetrievalConfig,
    ) -> Self {
        let real_permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let decoy_permits = Arc::new(Semaphore::new(config.decoy_concurrency.max(1)));
        Self {
            inner: Arc::new(Inner {
                store,
                peers,
                fetcher,
                config,
                real_permits,
                decoy_permits,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.inner.store
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.inner.peers
    }

    /// Resolve every real address of `manifest` and start decoy queries.
    pub async fn resolve(&self, manifest: &Manifest) -> Resolution {
        let decoys_issued = if self.inner.config.decoy_queries {
            self.spawn_decoy_queries(manifest.decoy_hashes())
        } else {
            0
        };

        let mut tasks = JoinSet::new();
        for address in manifest.chunks() {
            let inner = Arc::clone(&self.inner);
            let address = *address;
            tasks.spawn(async move {
                let Ok(_permit) = Arc::clone(&inner.real_permits).acquire_owned().await else {
                    return (address, Lookup::Missing);
                };
                let lookup = inner.lookup(&address).await;
                (address, lookup)
            });
        }

        let mut found = HashMap::with_capacity(manifest.chunks().len());
        let mut peer_hits = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((address, Lookup::Local(bytes))) => {
                    found.insert(address, bytes);
                }
                Ok((address, Lookup::Peer(bytes))) => {
                    peer_hits += 1;
                    found.insert(address, bytes);
                }
                Ok((address, Lookup::Missing)) => {
                    debug!(address = %address, "unresolved");
                }
                Err(e) => warn!("resolution task failed: {e}"),
            }
        }

        let unresolved: Vec<ContentAddress> = manifest
            .chunks()
            .iter()
            .filter(|a| !found.contains_key(*a))
            .copied()
            .collect();

        info!(
            filename = manifest.filename(),
            found = found.len(),
            unresolved = unresolved.len(),
            peer_hits,
            decoys_issued,
            "resolution complete"
        );

        Resolution {
            found,
            unresolved,
            peer_hits,
            decoys_issued,
            peers_tried: self.inner.peers.len(),
        }
    }

    /// Resolve a single address through the same local → peers → cache path.
    pub async fn resolve_address(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        match self.inner.lookup(address).await {
            Lookup::Local(bytes) | Lookup::Peer(bytes) => Some(bytes),
            Lookup::Missing => None,
        }
    }

    fn spawn_decoy_queries(&self, decoys: &[ContentAddress]) -> usize {
        for address in decoys {
            let inner = Arc::clone(&self.inner);
            let address = *address;
            tokio::spawn(async move {
                let Ok(_permit) = Arc::clone(&inner.decoy_permits).acquire_owned().await else {
                    return;
                };
                inner.lookup(&address).await;
            });
        }
        decoys.len()
    }
}

impl Inner {
    async fn lookup(&self, address: &ContentAddress) -> Lookup {
        if let Some(bytes) = self.local(address).await {
            return Lookup::Local(bytes);
        }

        let slot = self.slot(address);
        let lookup = {
            let _guard = slot.lock().await;
            match self.local(address).await {
                Some(bytes) => Lookup::Local(bytes),
                None => match self.query_peers(address).await {
                    Some(bytes) => Lookup::Peer(bytes),
                    None => Lookup::Missing,
                },
            }
        };
        self.release(address, slot);
        lookup
    }

    async fn local(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        match self.store.get(address).await {
            Ok(found) => found,
            Err(e) => {
                warn!(address = %address, "local store lookup failed: {e}");
                None
            }
        }
    }

    fn slot(&self, address: &ContentAddress) -> Slot {
        let mut table = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(table.entry(*address).or_default())
    }

    fn release(&self, address: &ContentAddress, slot: Slot) {
        let mut table = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // handles are only cloned under the table lock
        let shared = Arc::strong_count(&slot) > 2;
        drop(slot);
        if !shared {
            table.remove(address);
        }
    }

    async fn query_peers(&self, address: &ContentAddress) -> Option<Vec<u8>> {
        let timeout = self.config.peer_timeout();
        for peer in self.peers.iter() {
            let reply = tokio::time::timeout(timeout, self.fetcher.fetch(peer, address)).await;
            match reply {
                Ok(Ok(Some(bytes))) if address.matches(&bytes) => {
                    debug!(address = %address, peer = %peer, bytes = bytes.len(), "peer hit");
                    if let Err(e) = self.store.put(address, &bytes).await {
                        warn!(address = %address, "cache-fill failed: {e}");
                    }
                    return Some(bytes);
                }
                Ok(Ok(Some(_))) => {
                    warn!(address = %address, peer = %peer, "peer returned bytes that do not hash to the address");
                }
                Ok(Ok(None)) => {
                    debug!(address = %address, peer = %peer, "peer miss");
                }
                Ok(Err(e)) => {
                    warn!(address = %address, peer = %peer, "peer query failed: {e}");
                }
                Err(_) => {
                    warn!(address = %address, peer = %peer, ?timeout, "peer query timed out");
                }
            }
        }
        None
    }
}
