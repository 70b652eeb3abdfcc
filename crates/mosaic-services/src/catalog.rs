//! Catalog store: the files this node holds, keyed by content hash.
//!
//! Entries are immutable: a hash that is present always maps to the bytes
//! that produce it. Replications and imports of the same hash are
//! serialized through `lock_hash`, so a lookup and the commit that follows it
//! cannot interleave with another request for the same content.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use dashmap::DashMap;
use regex::Regex;
use tokio::sync::OwnedMutexGuard;

use mosaic_core::chunk::file_info;
use mosaic_core::{ContentHash, FileInfo};

/// One resident file.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub info: FileInfo,
    pub data: Bytes,
}

/// A replication request for content that was already present.
#[derive(Debug, Clone)]
pub struct Duplicate {
    /// The entry that already held this content.
    pub existing: FileInfo,
    /// Its bytes, when resident on this node.
    pub data: Option<Bytes>,
}

/// Filename search over one node's own files.
pub trait LocalSearch: Send + Sync {
    fn search_local(&self, pattern: &Regex) -> Vec<FileInfo>;
}

/// In-memory catalog, shared between all handler tasks.
#[derive(Clone, Default)]
pub struct CatalogStore {
    /// file hash → entry
    entries: Arc<DashMap<ContentHash, CatalogEntry>>,
    /// Append-only. Never deduplicated.
    duplicates: Arc<Mutex<Vec<Duplicate>>>,
    /// file hash → replication lock
    hash_locks: Arc<DashMap<ContentHash, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held while a replication for one hash is in progress.
pub struct HashGuard {
    hash: ContentHash,
    locks: Arc<DashMap<ContentHash, Arc<tokio::sync::Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for HashGuard {
    fn drop(&mut self) {
        // The map and this guard hold one reference each; more means waiters.
        self.locks
            .remove_if(&self.hash, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dedup lookup.
    pub fn lookup_by_hash(&self, hash: &ContentHash) -> Option<FileInfo> {
        self.entries.get(hash).map(|e| e.info.clone())
    }

    /// Bytes of a resident file.
    pub fn get(&self, hash: &ContentHash) -> Option<Bytes> {
        self.entries.get(hash).map(|e| e.data.clone())
    }

    /// Insert or overwrite. Callers verify `data` against `info.hash` first.
    pub fn put(&self, info: FileInfo, data: Bytes) {
        tracing::debug!(
            file_hash = %info.hash.short(),
            filename = %info.filename,
            bytes = data.len(),
            "catalog entry stored"
        );
        self.entries.insert(info.hash, CatalogEntry { info, data });
    }

    /// Snapshot of every resident file, ordered by filename.
    pub fn all(&self) -> Vec<FileInfo> {
        let mut files: Vec<FileInfo> = self.entries.iter().map(|e| e.info.clone()).collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename).then(a.hash.cmp(&b.hash)));
        files
    }

    pub fn record_duplicate(&self, existing: FileInfo, data: Option<Bytes>) {
        tracing::info!(
            file_hash = %existing.hash.short(),
            filename = %existing.filename,
            resident = data.is_some(),
            "duplicate submission recorded"
        );
        self.duplicates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Duplicate { existing, data });
    }

    pub fn duplicates(&self) -> Vec<Duplicate> {
        self.duplicates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total resident bytes (for stats).
    pub fn size(&self) -> u64 {
        self.entries.iter().map(|e| e.data.len() as u64).sum()
    }

    /// Serialize work on one content hash. Different hashes never contend.
    pub async fn lock_hash(&self, hash: ContentHash) -> HashGuard {
        let lock = self.hash_locks.entry(hash).or_default().clone();
        let guard = lock.lock_owned().await;
        HashGuard {
            hash,
            locks: self.hash_locks.clone(),
            _guard: guard,
        }
    }

    /// Add a local file, chunked at `chunk_size`. Existing content is left as is.
    ///
    /// Holds the hash lock, so an import racing a replication of the same
    /// content commits exactly once.
    pub async fn import(
        &self,
        filename: impl Into<String>,
        data: Bytes,
        chunk_size: usize,
    ) -> FileInfo {
        let info = file_info(filename, &data, chunk_size);
        let _guard = self.lock_hash(info.hash).await;
        if let Some(existing) = self.lookup_by_hash(&info.hash) {
            tracing::debug!(
                file_hash = %info.hash.short(),
                existing = %existing.filename,
                "import skipped, content already resident"
            );
            return existing;
        }
        self.put(info.clone(), data);
        info
    }
}

impl LocalSearch for CatalogStore {
    fn search_local(&self, pattern: &Regex) -> Vec<FileInfo> {
        self.all()
            .into_iter()
            .filter(|f| pattern.is_match(&f.filename))
            .collect()
    }
}
