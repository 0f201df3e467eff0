use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ChaffError, ChaffResult};
use crate::types::PeerEndpoint;

/// Top-level configuration (loaded from chaff.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaffConfig {
    pub node: NodeConfig,
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
    pub peers: PeersConfig,
    pub tls: TlsConfig,
    pub shelf: ShelfConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// TLS control channel listen address (manifest / public key requests)
    pub control_listen: String,
    /// Data channel listen address (chunk-by-hash requests)
    pub data_listen: String,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Deadline for one inbound connection, handshake through reply, in milliseconds
    pub request_timeout_ms: u64,
}

impl NodeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map; contents vanish on exit
    Memory,
    /// Filesystem via OpenDAL, rooted at `store.root`
    Fs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root directory for the `fs` backend
    pub root: PathBuf,
    /// Number of logical nodes the address space is partitioned across (1 = single node)
    pub partitions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum concurrent real-chunk resolutions
    pub concurrency: usize,
    /// Maximum concurrent decoy queries
    pub decoy_concurrency: usize,
    /// Per-peer query timeout in milliseconds
    pub peer_timeout_ms: u64,
    /// Issue cover queries for decoy addresses during resolution
    pub decoy_queries: bool,
}

impl RetrievalConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Data-channel endpoints queried on a local miss, in order
    pub endpoints: Vec<String>,
}

impl PeersConfig {
    pub fn parse_endpoints(&self) -> ChaffResult<Vec<PeerEndpoint>> {
        self.endpoints.iter().map(|s| s.parse()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM certificate chain presented by this node
    pub cert: Option<PathBuf>,
    /// PEM private key for `cert`
    pub key: Option<PathBuf>,
    /// PEM CA certificate(s) used to validate peers
    pub ca_cert: Option<PathBuf>,
    /// Expected server name when dialing peers
    pub server_name: String,
    /// Wrap the data channel in TLS too (default: cleartext, local/testing only)
    pub data_channel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    /// Directory holding `<filename>_manifest.json` files served over the control channel
    pub manifest_dir: PathBuf,
    /// Public key PEM served for `get_key`
    pub public_key: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            control_listen: "0.0.0.0:5000".into(),
            data_listen: "0.0.0.0:5001".into(),
            log_level: "info".into(),
            log_format: "text".into(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            root: PathBuf::from("~/.local/share/chaff/chunks"),
            partitions: 1,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            decoy_concurrency: 4,
            peer_timeout_ms: 5000,
            decoy_queries: true,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert: None,
            key: None,
            ca_cert: None,
            server_name: "localhost".into(),
            data_channel: false,
        }
    }
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from("manifest"),
            public_key: PathBuf::from("keys/pub.pem"),
        }
    }
}

impl ChaffConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> ChaffResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChaffError::Config(format!("reading config {}: {e}", path.display())))?;
        let config: ChaffConfig = toml::from_str(&content)
            .map_err(|e| ChaffError::Config(format!("parsing config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ChaffResult<()> {
        if self.retrieval.concurrency == 0 {
            return Err(ChaffError::Config("retrieval.concurrency must be > 0".into()));
        }
        if self.retrieval.decoy_concurrency == 0 {
            return Err(ChaffError::Config(
                "retrieval.decoy_concurrency must be > 0".into(),
            ));
        }
        if self.retrieval.peer_timeout_ms == 0 {
            return Err(ChaffError::Config(
                "retrieval.peer_timeout_ms must be > 0".into(),
            ));
        }
        if self.node.request_timeout_ms == 0 {
            return Err(ChaffError::Config("node.request_timeout_ms must be > 0".into()));
        }
        if self.store.partitions == 0 {
            return Err(ChaffError::Config("store.partitions must be > 0".into()));
        }
        self.peers.parse_endpoints()?;
        Ok(())
    }
}
