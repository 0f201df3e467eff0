//! Fixed-size chunking
//!
//! A file is cut into `CHUNK_SIZE` chunks in one forward pass, and each chunk
//! into `SUB_CHUNK_SIZE` sub-chunks. No sub-chunk crosses a chunk boundary,
//! so the final chunk of a file may yield one short sub-chunk.
//!
//! Sub-chunks are returned in file order; that order becomes the manifest's
//! reconstruction order.

/// Chunk size (16 KiB)
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Sub-chunk size (8 KiB): the unit of compression, encryption, and addressing
pub const SUB_CHUNK_SIZE: usize = 8 * 1024;

/// A sub-chunk's position within the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubChunk {
    /// Index of the enclosing chunk
    pub chunk_index: usize,
    /// Index within the enclosing chunk
    pub sub_index: usize,
    /// Byte offset within the source
    pub offset: usize,
    /// Length in bytes (1..=SUB_CHUNK_SIZE)
    pub length: usize,
}

impl SubChunk {
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.length]
    }
}

/// Split `data` into sub-chunks. Empty input yields no sub-chunks.
pub fn split(data: &[u8]) -> Vec<SubChunk> {
    let mut out = Vec::with_capacity(sub_chunk_count(data.len()));

    for (chunk_index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
        let chunk_offset = chunk_index * CHUNK_SIZE;
        for (sub_index, sub) in chunk.chunks(SUB_CHUNK_SIZE).enumerate() {
            out.push(SubChunk {
                chunk_index,
                sub_index,
                offset: chunk_offset + sub_index * SUB_CHUNK_SIZE,
                length: sub.len(),
            });
        }
    }

    out
}

/// Number of sub-chunks `split` produces for an input of `len` bytes
pub fn sub_chunk_count(len: usize) -> usize {
    let full = len / CHUNK_SIZE;
    let tail = len % CHUNK_SIZE;
    full * CHUNK_SIZE.div_ceil(SUB_CHUNK_SIZE) + tail.div_ceil(SUB_CHUNK_SIZE)
}
