//! The build cache: fingerprints of successfully indexed documents.
//!
//! The cache is loaded wholesale at the start of a rebuild, mutated in
//! memory as documents succeed, and flushed with a temp-file-then-rename
//! replace so readers never observe a half-written file. An entry exists
//! iff the document's last index attempt succeeded.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};
use crate::models::{CacheEntry, MemoryKind};

pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<MemoryKind, BTreeMap<String, CacheEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildCache {
    entries: BTreeMap<MemoryKind, BTreeMap<String, CacheEntry>>,
}

impl BuildCache {
    /// Load the cache from disk. A missing file is an empty cache; a file
    /// that exists but cannot be parsed is corrupt and fails fast.
    pub async fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let file: CacheFile = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if file.version != CACHE_FORMAT_VERSION {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported cache format version {}", file.version),
            });
        }

        Ok(Self {
            entries: file.entries,
        })
    }

    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries: self.entries.clone(),
        };
        write_json_atomic(path, &file).await
    }

    pub fn get(&self, kind: MemoryKind, path: &str) -> Option<&CacheEntry> {
        self.entries.get(&kind).and_then(|arena| arena.get(path))
    }

    /// Path-to-fingerprint view of one arena, in the shape the change
    /// detector consumes.
    pub fn fingerprints(&self, kind: MemoryKind) -> BTreeMap<String, String> {
        self.entries
            .get(&kind)
            .map(|arena| {
                arena
                    .iter()
                    .map(|(path, entry)| (path.clone(), entry.fingerprint.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record a successful index of one document. Called only after the
    /// indexer reported success for exactly this content.
    pub fn record_indexed(&mut self, kind: MemoryKind, path: &str, fingerprint: String) {
        self.entries.entry(kind).or_default().insert(
            path.to_string(),
            CacheEntry {
                fingerprint,
                indexed_at: Utc::now(),
            },
        );
    }

    pub fn remove(&mut self, kind: MemoryKind, path: &str) -> bool {
        self.entries
            .get_mut(&kind)
            .map(|arena| arena.remove(path).is_some())
            .unwrap_or(false)
    }

    pub fn arena_len(&self, kind: MemoryKind) -> usize {
        self.entries.get(&kind).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn total_len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }
}

/// Serialize `value` as pretty JSON and replace `path` atomically: write to
/// a sibling temp file, then rename over the target.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let payload =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, payload).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
