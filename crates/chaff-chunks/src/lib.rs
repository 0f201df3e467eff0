//! chaff-chunks: splitting, content addressing, and compression
//!
//! # Overview
//! - `split`: fixed 16 KiB chunks, each cut into 8 KiB sub-chunks (the unit of
//!   compression, encryption, and addressing)
//! - `address`: BLAKE3 content addresses computed over ciphertext
//! - `compress`: bounded zstd compression for sub-chunks

pub mod address;
pub mod compress;
pub mod split;

pub use address::{address_of, ContentAddress};
pub use compress::{compress, decompress, DEFAULT_LEVEL};
pub use split::{split, sub_chunk_count, SubChunk, CHUNK_SIZE, SUB_CHUNK_SIZE};
