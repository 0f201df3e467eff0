//! File manifest: everything needed to reconstruct one file from stored entries
//!
//! Serialized as JSON:
//! ```text
//! { "version": 1, "filename": "...", "chunks": ["<hex>", ...],
//!   "chunk_data": {"<hex>": "<base64>"},        (optional)
//!   "nonces": {"<hex>": "<base64>"},
//!   "decoy_hashes": ["<hex>", ...], "encrypted_key": "<hex>" }
//! ```
//!
//! A manifest is built once at encode time. The only later mutation is
//! `set_wrapped_key` (and `embed_ciphertext` for self-contained manifests).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chaff_chunks::ContentAddress;
use chaff_core::{ChaffError, ChaffResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::seal::{CipherEntry, Nonce};

/// Current manifest schema version
pub const MANIFEST_VERSION: u32 = 1;

fn default_version() -> u32 {
    MANIFEST_VERSION
}

/// RSA-wrapped file key, serialized as hex
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for WrappedKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl TryFrom<String> for WrappedKey {
    type Error = ChaffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        hex::decode(value)
            .map(WrappedKey)
            .map_err(|e| ChaffError::Protocol(format!("encrypted_key is not hex: {e}")))
    }
}

impl From<WrappedKey> for String {
    fn from(value: WrappedKey) -> Self {
        hex::encode(value.0)
    }
}

/// Ciphertext embedded in a manifest, serialized as base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
struct EmbeddedCiphertext(Vec<u8>);

impl TryFrom<String> for EmbeddedCiphertext {
    type Error = ChaffError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        STANDARD
            .decode(value.as_bytes())
            .map(EmbeddedCiphertext)
            .map_err(|e| ChaffError::Protocol(format!("chunk_data entry is not base64: {e}")))
    }
}

impl From<EmbeddedCiphertext> for String {
    fn from(value: EmbeddedCiphertext) -> Self {
        STANDARD.encode(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    version: u32,
    filename: String,
    /// Real entry addresses in reconstruction order
    chunks: Vec<ContentAddress>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    chunk_data: BTreeMap<ContentAddress, EmbeddedCiphertext>,
    nonces: BTreeMap<ContentAddress, Nonce>,
    #[serde(default)]
    decoy_hashes: Vec<ContentAddress>,
    #[serde(default)]
    encrypted_key: WrappedKey,
}

impl Manifest {
    /// Build a manifest from sealed real entries (in split order) and decoys.
    pub fn new(filename: impl Into<String>, real: &[CipherEntry], decoys: &[CipherEntry]) -> Self {
        let nonces = real
            .iter()
            .chain(decoys)
            .map(|e| (e.address, e.nonce))
            .collect();
        Self {
            version: MANIFEST_VERSION,
            filename: filename.into(),
            chunks: real.iter().map(|e| e.address).collect(),
            chunk_data: BTreeMap::new(),
            nonces,
            decoy_hashes: decoys.iter().map(|e| e.address).collect(),
            encrypted_key: WrappedKey::default(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn chunks(&self) -> &[ContentAddress] {
        &self.chunks
    }

    pub fn decoy_hashes(&self) -> &[ContentAddress] {
        &self.decoy_hashes
    }

    pub fn nonce(&self, address: &ContentAddress) -> Option<&Nonce> {
        self.nonces.get(address)
    }

    pub fn wrapped_key(&self) -> &WrappedKey {
        &self.encrypted_key
    }

    pub fn set_wrapped_key(&mut self, wrapped: impl Into<WrappedKey>) {
        self.encrypted_key = wrapped.into();
    }

    /// Embed ciphertext for every listed entry so the manifest can be
    /// reconstructed without a chunk store. Entries not listed are ignored.
    pub fn embed_ciphertext(&mut self, entries: &[CipherEntry]) {
        for entry in entries {
            if self.nonces.contains_key(&entry.address) {
                self.chunk_data
                    .insert(entry.address, EmbeddedCiphertext(entry.ciphertext.clone()));
            }
        }
    }

    pub fn has_embedded_ciphertext(&self) -> bool {
        !self.chunk_data.is_empty()
    }

    pub fn chunk_source(&self) -> ManifestChunkSource<'_> {
        ManifestChunkSource { manifest: self }
    }

    /// Check structural invariants. Every violation is a `Protocol` error.
    pub fn validate(&self) -> ChaffResult<()> {
        if self.version != MANIFEST_VERSION {
            return Err(ChaffError::Protocol(format!(
                "unsupported manifest version {}",
                self.version
            )));
        }

        let mut real = HashSet::with_capacity(self.chunks.len());
        for addr in &self.chunks {
            if !real.insert(addr) {
                return Err(ChaffError::Protocol(format!(
                    "address {addr} appears twice in chunks"
                )));
            }
            if !self.nonces.contains_key(addr) {
                return Err(ChaffError::Protocol(format!("no nonce for chunk {addr}")));
            }
        }

        let mut decoys = HashSet::with_capacity(self.decoy_hashes.len());
        for addr in &self.decoy_hashes {
            if real.contains(addr) {
                return Err(ChaffError::Protocol(format!(
                    "decoy {addr} also listed as a real chunk"
                )));
            }
            if !self.nonces.contains_key(addr) {
                return Err(ChaffError::Protocol(format!("no nonce for decoy {addr}")));
            }
            decoys.insert(addr);
        }

        let known = |addr: &ContentAddress| real.contains(addr) || decoys.contains(addr);
        if let Some(stray) = self.nonces.keys().find(|a| !known(a)) {
            return Err(ChaffError::Protocol(format!(
                "nonce for unlisted address {stray}"
            )));
        }
        if let Some(stray) = self.chunk_data.keys().find(|a| !known(a)) {
            return Err(ChaffError::Protocol(format!(
                "chunk_data for unlisted address {stray}"
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> ChaffResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ChaffError::Protocol(format!("serializing manifest: {e}")))
    }

    /// Parse and validate a manifest.
    pub fn from_json(text: &str) -> ChaffResult<Self> {
        let manifest: Manifest = serde_json::from_str(text)
            .map_err(|e| ChaffError::Protocol(format!("malformed manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }
}

/// Resolves addresses from a manifest's embedded `chunk_data`.
#[derive(Debug, Clone, Copy)]
pub struct ManifestChunkSource<'a> {
    manifest: &'a Manifest,
}

impl<'a> ManifestChunkSource<'a> {
    pub fn get(&self, address: &ContentAddress) -> Option<&'a [u8]> {
        self.manifest
            .chunk_data
            .get(address)
            .map(|c| c.0.as_slice())
    }
}
