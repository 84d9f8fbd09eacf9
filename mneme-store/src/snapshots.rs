//! Immutable full-copy snapshots of the derived state.
//!
//! A snapshot is the index directory plus the build cache, copied under
//! `snapshots/<version id>/` at version creation and never modified
//! afterwards. Capture stages into a temp directory and renames it into
//! place, so a half-copied snapshot is never visible under its final name.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::errors::{StoreError, StoreResult};
use crate::models::VersionId;
use crate::paths;

/// Transient backend files, never copied in either direction.
fn is_transient(name: &str) -> bool {
    name.ends_with(".lock")
        || name.ends_with(".tmp")
        || name.ends_with(".temp")
        || name.ends_with("-wal")
        || name.ends_with("-shm")
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn dir_for(&self, id: &VersionId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn exists(&self, id: &VersionId) -> bool {
        self.dir_for(id).is_dir()
    }

    /// Copy the index directory and cache file into a new snapshot.
    /// Returns the directory name recorded on the version entry.
    pub async fn capture(
        &self,
        id: &VersionId,
        index_dir: &Path,
        cache_path: &Path,
    ) -> StoreResult<String> {
        let final_dir = self.dir_for(id);
        if final_dir.exists() {
            return Err(StoreError::State(format!(
                "snapshot directory already exists: {}",
                final_dir.display()
            )));
        }

        let staging = self.root.join(format!("{id}.staging"));
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        if index_dir.is_dir() {
            copy_tree(index_dir, &staging.join(paths::INDEX_DIR)).await?;
        }
        if cache_path.is_file() {
            tokio::fs::copy(cache_path, staging.join(paths::CACHE_FILE)).await?;
        }

        tokio::fs::rename(&staging, &final_dir).await?;
        Ok(id.to_string())
    }

    /// Replace the live index directory and cache with the snapshot's
    /// contents. The index swap goes through a staged sibling directory so
    /// the live directory is either the old tree or the new one, never a
    /// mixture.
    pub async fn restore(
        &self,
        id: &VersionId,
        index_dir: &Path,
        cache_path: &Path,
    ) -> StoreResult<()> {
        let snapshot = self.dir_for(id);
        if !snapshot.is_dir() {
            return Err(StoreError::NotFound(format!(
                "snapshot directory missing for {id}"
            )));
        }

        let parent = index_dir
            .parent()
            .ok_or_else(|| StoreError::State("index directory has no parent".to_string()))?;
        let staged = parent.join(format!("{}.restore", paths::INDEX_DIR));
        let retired = parent.join(format!("{}.old", paths::INDEX_DIR));

        if staged.exists() {
            tokio::fs::remove_dir_all(&staged).await?;
        }
        let snapshot_index = snapshot.join(paths::INDEX_DIR);
        if snapshot_index.is_dir() {
            copy_tree(&snapshot_index, &staged).await?;
        } else {
            tokio::fs::create_dir_all(&staged).await?;
        }

        if retired.exists() {
            tokio::fs::remove_dir_all(&retired).await?;
        }
        if index_dir.exists() {
            tokio::fs::rename(index_dir, &retired).await?;
        }
        tokio::fs::rename(&staged, index_dir).await?;
        if retired.exists() {
            if let Err(err) = tokio::fs::remove_dir_all(&retired).await {
                warn!("could not remove retired index directory: {err}");
            }
        }

        let snapshot_cache = snapshot.join(paths::CACHE_FILE);
        if snapshot_cache.is_file() {
            let tmp = cache_path.with_extension("tmp");
            tokio::fs::copy(&snapshot_cache, &tmp).await?;
            tokio::fs::rename(&tmp, cache_path).await?;
        } else if cache_path.exists() {
            // the snapshot was taken before any cache existed
            tokio::fs::remove_file(cache_path).await?;
        }

        Ok(())
    }

    /// Delete one snapshot directory. Missing directories are fine.
    pub async fn delete(&self, id: &VersionId) -> StoreResult<()> {
        let dir = self.dir_for(id);
        if dir.is_dir() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    pub async fn size_bytes(&self, id: &VersionId) -> StoreResult<u64> {
        Ok(tree_size(&self.dir_for(id)))
    }

    pub async fn total_size(&self) -> StoreResult<u64> {
        Ok(tree_size(&self.root))
    }

    /// Directory names currently present under the snapshot root.
    pub async fn list_dirs(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        if !self.root.is_dir() {
            return Ok(names);
        }
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Safety copy of the live state taken before a restore mutates anything.
/// A failure here aborts the rollback while the live tree is still intact.
pub async fn backup_before_restore(
    backups_root: &Path,
    index_dir: &Path,
    cache_path: &Path,
) -> StoreResult<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let dir = backups_root.join(format!("pre_rollback_{stamp}"));
    tokio::fs::create_dir_all(&dir).await?;

    if index_dir.is_dir() {
        copy_tree(index_dir, &dir.join(paths::INDEX_DIR)).await?;
    }
    if cache_path.is_file() {
        tokio::fs::copy(cache_path, dir.join(paths::CACHE_FILE)).await?;
    }

    Ok(dir)
}

/// Recursive copy skipping transient files. Iterative walk, flat copy.
async fn copy_tree(src: &Path, dst: &Path) -> StoreResult<()> {
    tokio::fs::create_dir_all(dst).await?;

    for entry in WalkDir::new(src).into_iter().filter_map(|entry| entry.ok()) {
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };
        let target = dst.join(&rel);

        if entry.file_type().is_dir() {
            tokio::fs::create_dir_all(&target).await?;
        } else if entry.file_type().is_file() {
            let name = entry.file_name().to_string_lossy();
            if is_transient(&name) {
                continue;
            }
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(entry.path(), &target).await?;
        }
    }

    Ok(())
}

fn tree_size(root: &Path) -> u64 {
    if !root.exists() {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}
