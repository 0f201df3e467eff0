//! chaff-crypto: client-side encryption for chaff
//!
//! Pipeline per sub-chunk: zstd compress → AES-128-GCM seal (fresh nonce) →
//! BLAKE3 address of the ciphertext.
//!
//! Key hierarchy:
//! ```text
//! Recipient RSA-2048 keypair
//!   └── File key (per-file, 128-bit random, wrapped with RSA-OAEP-SHA256)
//!       └── Sub-chunk / decoy AEAD: AES-128-GCM (key=file_key, nonce=random 96-bit,
//!           unique per file key via NonceLedger)
//! ```

pub mod decoy;
pub mod keys;
pub mod manifest;
pub mod seal;
pub mod wrap;

pub use decoy::{decoy_count, generate_decoys, DECOY_PAYLOAD_SIZE};
pub use keys::{generate_symmetric_key, SymmetricKey};
pub use manifest::{Manifest, ManifestChunkSource, WrappedKey, MANIFEST_VERSION};
pub use seal::{open_entry, CipherEntry, Nonce, NonceLedger, Opener, Sealer};
pub use wrap::{public_key_from_pem, public_key_to_pem, unwrap_key, wrap_key, Keypair};
pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Size of a symmetric file key in bytes (128-bit)
pub const KEY_SIZE: usize = 16;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// RSA modulus size for recipient keypairs
pub const RSA_BITS: usize = 2048;
