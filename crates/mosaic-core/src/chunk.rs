//! Fixed-size chunking.
//!
//! A file is cut into consecutive `chunk_size` slices; only the last may be
//! shorter. Boundaries depend on nothing but the bytes and the chunk size, so
//! any node holding a file can recompute them independently.

use crate::hash::{hash, ContentHash, Hasher};
use crate::message::{ChunkInfo, FileInfo};

/// Default chunk size in bytes. Must match across every node in a deployment.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest chunk size a node will accept in configuration.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Split `data` into chunks and describe each one.
///
/// # Panics
/// Panics if `chunk_size` is zero. Configuration rejects that value.
pub fn chunk(data: &[u8], chunk_size: usize) -> Vec<ChunkInfo> {
    data.chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| ChunkInfo {
            index: index as u32,
            size: slice.len() as u32,
            hash: hash(slice),
        })
        .collect()
}

/// Re-chunk `data` and return the first slice whose hash is `target`.
///
/// Returns `None` when no slice matches; callers report that as a missing
/// chunk rather than substituting another slice.
pub fn find_chunk<'a>(data: &'a [u8], chunk_size: usize, target: &ContentHash) -> Option<&'a [u8]> {
    data.chunks(chunk_size).find(|slice| hash(slice) == *target)
}

/// The slice at `index`, by position only.
pub fn chunk_at(data: &[u8], chunk_size: usize, index: u32) -> Option<&[u8]> {
    data.chunks(chunk_size).nth(index as usize)
}

/// Build the catalog key for a named payload.
pub fn file_info(filename: impl Into<String>, data: &[u8], chunk_size: usize) -> FileInfo {
    FileInfo {
        filename: filename.into(),
        hash: hash(data),
        chunks: chunk(data, chunk_size),
    }
}

/// Hash a sequence of slices as if they were one contiguous buffer.
pub fn hash_concat<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> ContentHash {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}
