//! Encode a file into sealed entries + manifest, and decode it back
//!
//! Encode: split (16 KiB chunks, 8 KiB sub-chunks) → zstd → AES-128-GCM with a
//! fresh nonce → BLAKE3 address of the ciphertext. Decoys are sealed under the
//! same key and nonce ledger.
//!
//! Decode: fetch every address of `manifest.chunks()` through the resolver,
//! open and decompress in parallel, concatenate in manifest order.

use chaff_chunks::{compress, decompress, split, ContentAddress, DEFAULT_LEVEL};
use chaff_core::{ChaffError, ChaffResult};
use chaff_crypto::{
    decoy_count, generate_decoys, generate_symmetric_key, CipherEntry, Manifest, Opener, Sealer,
    SymmetricKey,
};
use rayon::prelude::*;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Add decoys at one per two real entries
    pub decoys: bool,
    /// zstd level for sub-chunks and decoys
    pub compression_level: i32,
    /// Carry every ciphertext inside the manifest's `chunk_data`
    pub embed_ciphertext: bool,
    /// Sleep a uniform random `(min, max)` between successive store writes
    /// during publish. Off by default.
    pub write_jitter: Option<(Duration, Duration)>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            decoys: true,
            compression_level: DEFAULT_LEVEL,
            embed_ciphertext: false,
            write_jitter: None,
        }
    }
}

/// Output of `encode`. Holds the only cleartext copy of the file key.
#[derive(Debug)]
pub struct EncodedFile {
    pub key: SymmetricKey,
    pub manifest: Manifest,
    /// Real entries in split order
    pub entries: Vec<CipherEntry>,
    pub decoys: Vec<CipherEntry>,
}

impl EncodedFile {
    /// Real and decoy entries, real first.
    pub fn all_entries(&self) -> impl Iterator<Item = &CipherEntry> {
        self.entries.iter().chain(self.decoys.iter())
    }
}

pub fn encode(filename: &str, data: &[u8], opts: &EncodeOptions) -> ChaffResult<EncodedFile> {
    let subs = split(data);
    let compressed = subs
        .par_iter()
        .map(|s| compress(s.slice(data), opts.compression_level))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let key = generate_symmetric_key();
    let mut sealer = Sealer::new(&key);
    let entries = sealer.seal_all(&compressed)?;
    let decoys = if opts.decoys {
        generate_decoys(
            &mut sealer,
            decoy_count(entries.len()),
            opts.compression_level,
        )?
    } else {
        Vec::new()
    };

    let mut manifest = Manifest::new(filename, &entries, &decoys);
    if opts.embed_ciphertext {
        manifest.embed_ciphertext(&entries);
        manifest.embed_ciphertext(&decoys);
    }

    info!(
        filename,
        bytes = data.len(),
        entries = entries.len(),
        decoys = decoys.len(),
        "encoded"
    );

    Ok(EncodedFile {
        key,
        manifest,
        entries,
        decoys,
    })
}

/// Read `path` and encode it under its final path component.
pub fn encode_file(path: &Path, opts: &EncodeOptions) -> ChaffResult<EncodedFile> {
    let data = std::fs::read(path).map_err(|source| ChaffError::Encoding {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ChaffError::Encoding {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        })?;
    encode(&filename, &data, opts)
}

/// Reassemble file bytes. `resolver` supplies the ciphertext for an address.
///
/// Every failure aborts the whole decode. With several bad addresses the
/// error names the first one in manifest order.
pub fn decode<'a, R>(manifest: &Manifest, key: &SymmetricKey, resolver: R) -> ChaffResult<Vec<u8>>
where
    R: Fn(&ContentAddress) -> Option<&'a [u8]>,
{
    let mut sealed = Vec::with_capacity(manifest.chunks().len());
    for address in manifest.chunks() {
        let nonce = manifest
            .nonce(address)
            .ok_or_else(|| ChaffError::Protocol(format!("manifest has no nonce for {address}")))?;
        let ciphertext = resolver(address).ok_or_else(|| ChaffError::ChunkUnresolved {
            address: address.to_hex(),
            peers_tried: 0,
        })?;
        sealed.push((address, nonce, ciphertext));
    }

    let opener = Opener::new(key);
    let opened: Vec<ChaffResult<Vec<u8>>> = sealed
        .par_iter()
        .map(|(address, nonce, ciphertext)| {
            let compressed = opener.open(address, nonce, ciphertext)?;
            decompress(&compressed).map_err(|e| {
                debug!(address = %address, "decompression failed after valid tag: {e}");
                ChaffError::Integrity {
                    address: address.to_hex(),
                }
            })
        })
        .collect();

    let mut out = Vec::new();
    for plain in opened {
        out.extend_from_slice(&plain?);
    }
    debug!(filename = manifest.filename(), bytes = out.len(), "decoded");
    Ok(out)
}
