//! On-disk layout of the store.
//!
//! ```text
//! <data root>/
//!   corpus/<kind>/        source documents (override: MNEME_CORPUS_DIR)
//!   index/mneme.db        derived sqlite index
//!   build_cache.json      fingerprints of successfully indexed documents
//!   version_registry.json append-only version log
//!   snapshots/<version>/  immutable copies of index/ + cache
//!   backups/              safety copies taken before a rollback
//!   mneme.lock            writer exclusion
//! ```

use std::path::PathBuf;

use mneme_core::StoreSettings;

use crate::errors::{StoreError, StoreResult};
use crate::models::MemoryKind;

pub const CACHE_FILE: &str = "build_cache.json";
pub const REGISTRY_FILE: &str = "version_registry.json";
pub const LOCK_FILE: &str = "mneme.lock";
pub const DB_FILE: &str = "mneme.db";
pub const INDEX_DIR: &str = "index";
pub const SNAPSHOTS_DIR: &str = "snapshots";
pub const BACKUPS_DIR: &str = "backups";
pub const CORPUS_DIR: &str = "corpus";

/// Root for all derived state. Resolution order: settings override,
/// `MNEME_DATA_DIR`, then the platform data dir.
pub fn data_root(settings: &StoreSettings) -> StoreResult<PathBuf> {
    if let Some(root) = &settings.data_root_override {
        return Ok(root.clone());
    }
    if let Ok(dir) = std::env::var("MNEME_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::data_dir().ok_or(StoreError::MissingDataDir)?;
    Ok(base.join("mneme"))
}

/// Root holding one subdirectory per memory kind. Resolution order:
/// settings override, `MNEME_CORPUS_DIR`, then `corpus/` under the data root.
pub fn corpus_root(settings: &StoreSettings) -> StoreResult<PathBuf> {
    if let Some(root) = &settings.corpus_root_override {
        return Ok(root.clone());
    }
    if let Ok(dir) = std::env::var("MNEME_CORPUS_DIR") {
        return Ok(PathBuf::from(dir));
    }
    Ok(data_root(settings)?.join(CORPUS_DIR))
}

pub fn corpus_dir(settings: &StoreSettings, kind: MemoryKind) -> StoreResult<PathBuf> {
    Ok(corpus_root(settings)?.join(kind.as_str()))
}

pub fn cache_path(settings: &StoreSettings) -> StoreResult<PathBuf> {
    Ok(data_root(settings)?.join(CACHE_FILE))
}

pub fn registry_path(settings: &StoreSettings) -> StoreResult<PathBuf> {
    Ok(data_root(settings)?.join(REGISTRY_FILE))
}

pub fn lock_path(settings: &StoreSettings) -> StoreResult<PathBuf> {
    Ok(data_root(settings)?.join(LOCK_FILE))
}

pub fn index_dir(settings: &StoreSettings) -> StoreResult<PathBuf> {
    Ok(data_root(settings)?.join(INDEX_DIR))
}

pub fn index_db_path(settings: &StoreSettings) -> StoreResult<PathBuf> {
    Ok(index_dir(settings)?.join(DB_FILE))
}

pub fn snapshots_root(settings: &StoreSettings) -> StoreResult<PathBuf> {
    Ok(data_root(settings)?.join(SNAPSHOTS_DIR))
}

pub fn backups_root(settings: &StoreSettings) -> StoreResult<PathBuf> {
    Ok(data_root(settings)?.join(BACKUPS_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_takes_priority() {
        let settings = StoreSettings {
            data_root_override: Some(PathBuf::from("/tmp/mneme-test")),
            ..Default::default()
        };
        assert_eq!(
            data_root(&settings).unwrap(),
            PathBuf::from("/tmp/mneme-test")
        );
        assert_eq!(
            cache_path(&settings).unwrap(),
            PathBuf::from("/tmp/mneme-test/build_cache.json")
        );
        assert_eq!(
            index_db_path(&settings).unwrap(),
            PathBuf::from("/tmp/mneme-test/index/mneme.db")
        );
    }

    #[test]
    fn test_corpus_dirs_nest_under_corpus_root() {
        let settings = StoreSettings {
            data_root_override: Some(PathBuf::from("/tmp/mneme-test")),
            ..Default::default()
        };
        assert_eq!(
            corpus_dir(&settings, MemoryKind::Factual).unwrap(),
            PathBuf::from("/tmp/mneme-test/corpus/factual")
        );
        assert_eq!(
            corpus_dir(&settings, MemoryKind::Rule).unwrap(),
            PathBuf::from("/tmp/mneme-test/corpus/rule")
        );
    }

    #[test]
    fn test_separate_corpus_override() {
        let settings = StoreSettings {
            data_root_override: Some(PathBuf::from("/tmp/mneme-data")),
            corpus_root_override: Some(PathBuf::from("/srv/corpus")),
            ..Default::default()
        };
        assert_eq!(
            corpus_dir(&settings, MemoryKind::Example).unwrap(),
            PathBuf::from("/srv/corpus/example")
        );
        // derived state stays under the data root
        assert_eq!(
            registry_path(&settings).unwrap(),
            PathBuf::from("/tmp/mneme-data/version_registry.json")
        );
    }
}
