//! zstd compression for sub-chunks
//!
//! Output of `decompress` is capped at `SUB_CHUNK_SIZE`: nothing the encoder
//! produces inflates beyond that, so a larger frame is rejected instead of
//! being expanded.

use anyhow::{Context, Result};

use crate::split::SUB_CHUNK_SIZE;

/// Default compression level
pub const DEFAULT_LEVEL: i32 = 3;

/// Compress one sub-chunk (or decoy payload).
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::bulk::compress(data, level).context("zstd compress")
}

/// Decompress one sub-chunk, refusing output larger than `SUB_CHUNK_SIZE`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::bulk::decompress(data, SUB_CHUNK_SIZE).context("zstd decompress")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip_small() {
        let data = b"hello chaff zstd";
        let c = compress(data, DEFAULT_LEVEL).unwrap();
        assert_eq!(decompress(&c).unwrap(), data);
    }

    #[test]
    fn round_trip_empty() {
        let c = compress(b"", DEFAULT_LEVEL).unwrap();
        assert!(!c.is_empty(), "an empty frame still has a header");
        assert!(decompress(&c).unwrap().is_empty());
    }

    #[test]
    fn repetitive_data_shrinks() {
        let data = vec![0xABu8; SUB_CHUNK_SIZE];
        let c = compress(&data, DEFAULT_LEVEL).unwrap();
        assert!(c.len() < data.len() / 10);
    }

    #[test]
    fn oversized_frame_rejected() {
        let data = vec![0u8; SUB_CHUNK_SIZE * 4];
        let c = compress(&data, DEFAULT_LEVEL).unwrap();
        assert!(decompress(&c).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(decompress(b"definitely not zstd").is_err());
    }

    proptest! {
        #[test]
        fn compress_decompress_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..=SUB_CHUNK_SIZE)) {
            let c = compress(&data, DEFAULT_LEVEL).unwrap();
            prop_assert_eq!(decompress(&c).unwrap(), data);
        }
    }
}
