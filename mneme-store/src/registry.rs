//! The append-only version registry.
//!
//! Entries are only ever appended; rollback flips the `active` flag and
//! cleanup clears `snapshot_dir`, but no entry is ever removed. The file
//! is validated on every load: out-of-order sequence numbers, duplicate
//! ids, or more than one active entry mean the file was tampered with or
//! half-written, and the store refuses to run on top of it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::write_json_atomic;
use crate::errors::{StoreError, StoreResult};
use crate::models::{VersionEntry, VersionId};

pub const REGISTRY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    #[serde(default)]
    entries: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct VersionRegistry {
    entries: Vec<VersionEntry>,
}

impl VersionRegistry {
    /// Load and validate the registry. A missing file is an empty registry.
    pub async fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let file: RegistryFile = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if file.version != REGISTRY_FORMAT_VERSION {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported registry format version {}", file.version),
            });
        }

        if let Err(reason) = validate(&file.entries) {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason,
            });
        }

        Ok(Self {
            entries: file.entries,
        })
    }

    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let file = RegistryFile {
            version: REGISTRY_FORMAT_VERSION,
            entries: self.entries.clone(),
        };
        write_json_atomic(path, &file).await
    }

    pub fn entries(&self) -> &[VersionEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: &VersionId) -> Option<&VersionEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn active(&self) -> Option<&VersionEntry> {
        self.entries.iter().find(|entry| entry.active)
    }

    pub fn latest(&self) -> Option<&VersionEntry> {
        self.entries.last()
    }

    /// Sequence number for the next version. Valid only while the writer
    /// lock is held, otherwise two writers could mint the same id.
    pub fn next_seq(&self) -> u64 {
        self.entries.last().map(|entry| entry.id.seq() + 1).unwrap_or(1)
    }

    /// Append a new entry, keeping ids strictly increasing and the active
    /// flag unique.
    pub fn append(&mut self, entry: VersionEntry) -> StoreResult<()> {
        if let Some(last) = self.entries.last() {
            if entry.id.seq() <= last.id.seq() {
                return Err(StoreError::State(format!(
                    "version id {} does not advance past {}",
                    entry.id, last.id
                )));
            }
        }
        if entry.active && self.active().is_some() {
            return Err(StoreError::State(format!(
                "cannot append {} as active: another version is already active",
                entry.id
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Move the active flag to `id`. The single-active invariant holds
    /// before and after; callers hold the writer lock across load, switch,
    /// and save so the swap is atomic.
    pub fn set_active(&mut self, id: &VersionId) -> StoreResult<()> {
        if self.get(id).is_none() {
            return Err(StoreError::NotFound(format!("unknown version: {id}")));
        }
        for entry in &mut self.entries {
            entry.active = &entry.id == id;
        }
        Ok(())
    }

    /// Forget the snapshot directory of `id` after cleanup deleted it.
    pub fn clear_snapshot(&mut self, id: &VersionId) -> StoreResult<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| &entry.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("unknown version: {id}")))?;
        entry.snapshot_dir = None;
        Ok(())
    }
}

fn validate(entries: &[VersionEntry]) -> Result<(), String> {
    let mut active = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        if entry.active {
            active += 1;
        }
        if i > 0 {
            let previous = &entries[i - 1];
            if entry.id.seq() <= previous.id.seq() {
                return Err(format!(
                    "sequence numbers not strictly increasing: {} then {}",
                    previous.id, entry.id
                ));
            }
        }
    }
    if active > 1 {
        return Err(format!("{active} versions are marked active, expected at most one"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn entry(seq: u64, active: bool) -> VersionEntry {
        VersionEntry {
            id: VersionId::mint(seq, Utc::now()),
            created_at: Utc::now(),
            description: None,
            active,
            record_counts: BTreeMap::new(),
            source_digests: BTreeMap::new(),
            snapshot_dir: Some(format!("v{seq}_dir")),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_registry() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = VersionRegistry::load(&dir.path().join("version_registry.json"))
            .await
            .unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.next_seq(), 1);
    }

    #[tokio::test]
    async fn test_append_save_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("version_registry.json");

        let mut registry = VersionRegistry::default();
        registry.append(entry(1, true)).unwrap();
        registry.append(entry(2, false)).unwrap();
        registry.save(&path).await.unwrap();

        let loaded = VersionRegistry::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.active().unwrap().id.seq(), 1);
        assert_eq!(loaded.latest().unwrap().id.seq(), 2);
        assert_eq!(loaded.next_seq(), 3);
    }

    #[test]
    fn test_append_rejects_non_increasing_ids() {
        let mut registry = VersionRegistry::default();
        registry.append(entry(5, false)).unwrap();
        assert!(matches!(
            registry.append(entry(5, false)),
            Err(StoreError::State(_))
        ));
        assert!(matches!(
            registry.append(entry(3, false)),
            Err(StoreError::State(_))
        ));
        registry.append(entry(6, false)).unwrap();
    }

    #[test]
    fn test_append_rejects_second_active() {
        let mut registry = VersionRegistry::default();
        registry.append(entry(1, true)).unwrap();
        assert!(matches!(
            registry.append(entry(2, true)),
            Err(StoreError::State(_))
        ));
    }

    #[test]
    fn test_set_active_swaps_single_flag() {
        let mut registry = VersionRegistry::default();
        registry.append(entry(1, true)).unwrap();
        registry.append(entry(2, false)).unwrap();

        let target = registry.entries()[1].id.clone();
        registry.set_active(&target).unwrap();
        assert_eq!(registry.active().unwrap().id, target);
        assert_eq!(
            registry.entries().iter().filter(|e| e.active).count(),
            1
        );

        let ghost = VersionId::mint(99, Utc::now());
        assert!(matches!(
            registry.set_active(&ghost),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_fast() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("version_registry.json");
        tokio::fs::write(&path, "[1, 2").await.unwrap();
        assert!(matches!(
            VersionRegistry::load(&path).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_two_active_entries_fail_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("version_registry.json");

        let file = RegistryFile {
            version: REGISTRY_FORMAT_VERSION,
            entries: vec![entry(1, true), entry(2, true)],
        };
        tokio::fs::write(&path, serde_json::to_vec(&file).unwrap())
            .await
            .unwrap();

        match VersionRegistry::load(&path).await {
            Err(StoreError::Corrupt { reason, .. }) => {
                assert!(reason.contains("active"), "reason was: {reason}");
            }
            other => panic!("expected Corrupt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_out_of_order_sequences_fail_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("version_registry.json");

        let file = RegistryFile {
            version: REGISTRY_FORMAT_VERSION,
            entries: vec![entry(2, false), entry(1, false)],
        };
        tokio::fs::write(&path, serde_json::to_vec(&file).unwrap())
            .await
            .unwrap();

        assert!(matches!(
            VersionRegistry::load(&path).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_clear_snapshot() {
        let mut registry = VersionRegistry::default();
        registry.append(entry(1, true)).unwrap();
        let id = registry.entries()[0].id.clone();

        registry.clear_snapshot(&id).unwrap();
        assert!(registry.get(&id).unwrap().snapshot_dir.is_none());
    }
}
