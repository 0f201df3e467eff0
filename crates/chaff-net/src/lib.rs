//! chaff-net: the two wire protocols
//!
//! - **Control channel** (TLS, JSON): `get_manifest` / `get_key`, answered from
//!   a `ManifestShelf`.
//! - **Data channel** (raw bytes): one content address in, one ciphertext (or
//!   nothing) out. `DataChannelClient` is the engine's `PeerFetcher`.
//!
//! Neither channel keeps session state; every request is its own connection.

pub mod control;
pub mod data;
pub mod tls;
pub mod wire;

pub use control::{ControlClient, ControlRequest, ControlResponse, ControlServer, ManifestShelf};
pub use data::{DataChannelClient, DataServer};
pub use tls::{acceptor, acceptor_from_config, client_from_config, TlsClient};
