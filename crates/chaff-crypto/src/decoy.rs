//! Decoy entries
//!
//! A decoy is a random 128-byte alphanumeric payload pushed through the same
//! compress → seal path as a real sub-chunk, under the same file key and
//! nonce ledger. Stored and fetched exactly like real entries, decoys are
//! listed only in the manifest's `decoy_hashes`.

use anyhow::Result;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::seal::{CipherEntry, Sealer};

/// Size of a decoy payload before compression
pub const DECOY_PAYLOAD_SIZE: usize = 128;

/// Default decoy policy: one decoy for every two real entries.
pub fn decoy_count(real_entries: usize) -> usize {
    real_entries / 2
}

/// Produce `count` sealed decoys with the sealer's key.
pub fn generate_decoys(sealer: &mut Sealer, count: usize, level: i32) -> Result<Vec<CipherEntry>> {
    let payloads = (0..count)
        .map(|_| chaff_chunks::compress(&decoy_payload(), level))
        .collect::<Result<Vec<_>>>()?;
    sealer.seal_all(&payloads)
}

fn decoy_payload() -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DECOY_PAYLOAD_SIZE)
        .collect()
}
