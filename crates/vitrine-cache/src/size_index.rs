//! Persisted key → size map for O(1) total-cache-size queries.

use std::{collections::HashMap, io::Write, path::PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{CacheError, CacheResult};

const FILE_VERSION: u32 = 1;

/// On-disk shape. Entries are a sorted list for stable JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SizeIndexFile {
    version: u32,
    entries: Vec<SizeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SizeRecord {
    key: String,
    size_bytes: u64,
}

/// Small persisted side index: `"bucket/key" -> size_bytes`.
///
/// Best-effort metadata; the cache backend is the source of truth. The index
/// is updated in lockstep with every write/delete but is not reconciled if
/// one of the two updates fails — `sum(records)` only approximates the
/// actual bytes used, and callers fall back to backend enumeration when the
/// index is empty.
pub struct CacheSizeIndex {
    path: PathBuf,
    records: RwLock<HashMap<String, u64>>,
}

impl CacheSizeIndex {
    /// Loads the index from `path`; a missing or unreadable file yields an
    /// empty index (first run, or lost metadata).
    pub fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<SizeIndexFile>(&bytes) {
                Ok(file) => file
                    .entries
                    .into_iter()
                    .map(|r| (r.key, r.size_bytes))
                    .collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "size index unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    /// The index key for one object.
    pub fn cache_key(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }

    /// Upserts one record. Called after every successful cache write.
    pub fn set(&self, bucket: &str, key: &str, size_bytes: u64) -> CacheResult<()> {
        self.records
            .write()
            .insert(Self::cache_key(bucket, key), size_bytes);
        self.persist()
    }

    /// Deletes one record. Called after every successful cache delete.
    pub fn remove(&self, bucket: &str, key: &str) -> CacheResult<()> {
        self.records.write().remove(&Self::cache_key(bucket, key));
        self.persist()
    }

    /// Removes all records.
    pub fn clear(&self) -> CacheResult<()> {
        self.records.write().clear();
        self.persist()
    }

    /// Sum of all recorded sizes.
    pub fn total_bytes(&self) -> u64 {
        self.records.read().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<u64> {
        self.records.read().get(&Self::cache_key(bucket, key)).copied()
    }

    /// Write-temp then rename, so the file is either the old or the new
    /// version, never a torn write.
    fn persist(&self) -> CacheResult<()> {
        let mut entries: Vec<SizeRecord> = self
            .records
            .read()
            .iter()
            .map(|(key, size)| SizeRecord {
                key: key.clone(),
                size_bytes: *size,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let file = SizeIndexFile {
            version: FILE_VERSION,
            entries,
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let parent = self
            .path
            .parent()
            .ok_or_else(|| CacheError::Index("index path has no parent dir".to_string()))?;
        std::fs::create_dir_all(parent).map_err(|e| CacheError::Index(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CacheError::Index(e.to_string()))?;
        tmp.write_all(&json)
            .map_err(|e| CacheError::Index(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| CacheError::Index(e.to_string()))?;
        Ok(())
    }
}
