//! The store engine: one handle tying settings and the index backend
//! together, with every public operation delegated to a submodule.

use std::sync::Arc;
use std::time::Duration;

use mneme_core::{EmbeddingSettings, StoreSettings};

use crate::errors::StoreResult;
use crate::indexer::DocumentIndexer;
use crate::models::{
    CleanupReport, MemoryKind, RebuildReport, StatusReport, VersionDiff, VersionEntry, VersionId,
};
use crate::vector::SqliteIndexer;

pub(crate) mod rebuild;
pub(crate) mod status;
pub(crate) mod versions;

/// Options for one rebuild run.
#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Restrict the run to these kinds; None rebuilds every corpus.
    pub kinds: Option<Vec<MemoryKind>>,
    /// Treat every on-disk document as changed, ignoring the cache.
    pub force: bool,
    /// Detect and report changes without indexing or writing anything.
    pub dry_run: bool,
    /// Record a version (with snapshot) after a successful rebuild.
    pub create_version: bool,
    /// Description for the created version.
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MnemeEngine {
    settings: StoreSettings,
    indexer: Arc<dyn DocumentIndexer>,
}

impl MnemeEngine {
    /// Open the engine with the default sqlite backend.
    pub async fn open(settings: StoreSettings, embedding: EmbeddingSettings) -> StoreResult<Self> {
        let db_path = crate::paths::index_db_path(&settings)?;
        let indexer = SqliteIndexer::open(&db_path, &settings, &embedding).await?;
        Ok(Self {
            settings,
            indexer: Arc::new(indexer),
        })
    }

    /// Open the engine over any indexer implementation.
    pub fn with_indexer(settings: StoreSettings, indexer: Arc<dyn DocumentIndexer>) -> Self {
        Self { settings, indexer }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub(crate) fn indexer(&self) -> &Arc<dyn DocumentIndexer> {
        &self.indexer
    }

    /// Detect changes and reindex what changed. See `RebuildOptions`.
    pub async fn rebuild(&self, options: RebuildOptions) -> StoreResult<RebuildReport> {
        rebuild::run(self, options).await
    }

    /// Record the current indexed state as a new version with a snapshot.
    pub async fn create_version(&self, description: Option<String>) -> StoreResult<VersionEntry> {
        versions::create(self, description).await
    }

    /// All registry entries, oldest first.
    pub async fn list_versions(&self) -> StoreResult<Vec<VersionEntry>> {
        versions::list(self).await
    }

    /// The currently active version, or NotFound when none exists.
    pub async fn active_version(&self) -> StoreResult<VersionEntry> {
        versions::active(self).await
    }

    /// Compare two versions by record counts and source digests.
    pub async fn diff_versions(&self, from: &VersionId, to: &VersionId) -> StoreResult<VersionDiff> {
        versions::diff(self, from, to).await
    }

    /// Restore a version's snapshot over the live state. Unless
    /// `data_only` is set, the active pointer moves to the restored
    /// version. Closes the index backend; reopen the engine to index
    /// again afterwards.
    pub async fn rollback(&self, id: &VersionId, data_only: bool) -> StoreResult<VersionEntry> {
        versions::rollback(self, id, data_only).await
    }

    /// Delete old snapshots, keeping the most recent `keep` plus whatever
    /// is active. Registry entries always survive.
    pub async fn cleanup(&self, keep: usize, dry_run: bool) -> StoreResult<CleanupReport> {
        versions::cleanup(self, keep, dry_run).await
    }

    /// Read-only summary of corpora, cache, versions, and snapshots.
    pub async fn status(&self) -> StoreResult<StatusReport> {
        status::run(self).await
    }

    /// Watch the corpus and rebuild incrementally until interrupted.
    pub async fn watch(&self, debounce: Duration) -> StoreResult<()> {
        crate::watcher::run_watcher(self, debounce).await
    }
}
