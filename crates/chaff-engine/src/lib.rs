//! chaff-engine: turning files into stored entries and back
//!
//! Write path: `codec::encode` → `pipeline::publish` (wrap key, store real and
//! decoy entries in shuffled order).
//!
//! Read path: `RetrievalEngine::resolve` (local store, then peers, with
//! cache-fill) → `codec::decode` (strictly in manifest order).

pub mod codec;
pub mod peers;
pub mod pipeline;
pub mod retrieval;

pub use codec::{decode, encode, encode_file, EncodeOptions, EncodedFile};
pub use peers::PeerDirectory;
pub use pipeline::{publish, publish_file, reconstruct, reconstruct_to_dir, RECEIVED_PREFIX};
pub use retrieval::{PeerFetcher, Resolution, RetrievalEngine};
