//! Version lifecycle: create, list, diff, rollback, cleanup.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{info, warn};

use crate::corpus;
use crate::engine::MnemeEngine;
use crate::errors::{StoreError, StoreResult};
use crate::lock::StoreLock;
use crate::models::{
    CleanupReport, CountDelta, MemoryKind, VersionDiff, VersionEntry, VersionId,
};
use crate::paths;
use crate::registry::VersionRegistry;
use crate::snapshots::{self, SnapshotStore};

pub(crate) async fn create(
    engine: &MnemeEngine,
    description: Option<String>,
) -> StoreResult<VersionEntry> {
    let _lock = StoreLock::acquire(&paths::lock_path(engine.settings())?, "create-version")?;
    create_locked(engine, description).await
}

/// Version creation body. The caller must hold the writer lock: the id is
/// minted from the registry tail, and that is only safe single-writer.
pub(crate) async fn create_locked(
    engine: &MnemeEngine,
    description: Option<String>,
) -> StoreResult<VersionEntry> {
    let settings = engine.settings();
    let registry_path = paths::registry_path(settings)?;
    let mut registry = VersionRegistry::load(&registry_path).await?;

    let now = Utc::now();
    let id = VersionId::mint(registry.next_seq(), now);

    let mut record_counts = BTreeMap::new();
    let mut source_digests = BTreeMap::new();
    for kind in MemoryKind::all() {
        record_counts.insert(kind, engine.indexer().count(kind).await?);
        let root = paths::corpus_dir(settings, kind)?;
        source_digests.insert(kind, corpus::corpus_digest(kind, &root).await?);
    }

    // Flush the backend so the files we are about to copy are complete.
    engine.indexer().checkpoint().await?;

    let snapshot_store = SnapshotStore::new(paths::snapshots_root(settings)?);
    let snapshot_dir = snapshot_store
        .capture(&id, &paths::index_dir(settings)?, &paths::cache_path(settings)?)
        .await?;

    let entry = VersionEntry {
        id: id.clone(),
        created_at: now,
        description,
        // Only the very first version activates itself; later versions
        // wait until a rollback promotes them.
        active: registry.is_empty(),
        record_counts,
        source_digests,
        snapshot_dir: Some(snapshot_dir),
    };

    registry.append(entry.clone())?;
    registry.save(&registry_path).await?;

    info!(version = %id, records = entry.total_records(), "version created");
    Ok(entry)
}

pub(crate) async fn list(engine: &MnemeEngine) -> StoreResult<Vec<VersionEntry>> {
    let registry = VersionRegistry::load(&paths::registry_path(engine.settings())?).await?;
    Ok(registry.entries().to_vec())
}

pub(crate) async fn active(engine: &MnemeEngine) -> StoreResult<VersionEntry> {
    let registry = VersionRegistry::load(&paths::registry_path(engine.settings())?).await?;
    registry
        .active()
        .cloned()
        .ok_or_else(|| StoreError::NotFound("no active version".to_string()))
}

pub(crate) async fn diff(
    engine: &MnemeEngine,
    from: &VersionId,
    to: &VersionId,
) -> StoreResult<VersionDiff> {
    let registry = VersionRegistry::load(&paths::registry_path(engine.settings())?).await?;
    let from_entry = registry
        .get(from)
        .ok_or_else(|| StoreError::NotFound(format!("unknown version: {from}")))?;
    let to_entry = registry
        .get(to)
        .ok_or_else(|| StoreError::NotFound(format!("unknown version: {to}")))?;

    let mut record_counts = BTreeMap::new();
    let mut source_changed = BTreeMap::new();
    for kind in MemoryKind::all() {
        let before = from_entry.record_counts.get(&kind).copied().unwrap_or(0);
        let after = to_entry.record_counts.get(&kind).copied().unwrap_or(0);
        record_counts.insert(kind, CountDelta { before, after });
        source_changed.insert(
            kind,
            from_entry.source_digests.get(&kind) != to_entry.source_digests.get(&kind),
        );
    }

    Ok(VersionDiff {
        from: from_entry.id.clone(),
        to: to_entry.id.clone(),
        from_created_at: from_entry.created_at,
        to_created_at: to_entry.created_at,
        record_counts,
        source_changed,
    })
}

pub(crate) async fn rollback(
    engine: &MnemeEngine,
    id: &VersionId,
    data_only: bool,
) -> StoreResult<VersionEntry> {
    let settings = engine.settings();
    let _lock = StoreLock::acquire(&paths::lock_path(settings)?, "rollback")?;

    let registry_path = paths::registry_path(settings)?;
    let mut registry = VersionRegistry::load(&registry_path).await?;
    let entry = registry
        .get(id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("unknown version: {id}")))?;
    if entry.snapshot_dir.is_none() {
        return Err(StoreError::NotFound(format!(
            "snapshot for {id} was removed by cleanup"
        )));
    }

    let snapshot_store = SnapshotStore::new(paths::snapshots_root(settings)?);
    if !snapshot_store.exists(id) {
        return Err(StoreError::NotFound(format!(
            "snapshot directory missing for {id}"
        )));
    }

    let index_dir = paths::index_dir(settings)?;
    let cache_path = paths::cache_path(settings)?;

    // Quiesce and release the backend's files before replacing them.
    engine.indexer().checkpoint().await?;
    engine.indexer().close().await?;

    // Safety copy first. If this fails the live tree is untouched.
    let backup =
        snapshots::backup_before_restore(&paths::backups_root(settings)?, &index_dir, &cache_path)
            .await?;
    info!(backup = %backup.display(), "pre-rollback backup written");

    snapshot_store.restore(id, &index_dir, &cache_path).await?;

    if !data_only {
        registry.set_active(id)?;
        registry.save(&registry_path).await?;
    }

    let restored = registry
        .get(id)
        .cloned()
        .ok_or_else(|| StoreError::State(format!("version {id} vanished during rollback")))?;
    info!(version = %id, data_only, "rollback complete");
    Ok(restored)
}

pub(crate) async fn cleanup(
    engine: &MnemeEngine,
    keep: usize,
    dry_run: bool,
) -> StoreResult<CleanupReport> {
    let settings = engine.settings();
    let _lock = if dry_run {
        None
    } else {
        Some(StoreLock::acquire(&paths::lock_path(settings)?, "cleanup")?)
    };

    let registry_path = paths::registry_path(settings)?;
    let mut registry = VersionRegistry::load(&registry_path).await?;
    let snapshot_store = SnapshotStore::new(paths::snapshots_root(settings)?);

    // Retention floor: the most recent snapshot and the active version
    // survive every cleanup, whatever `keep` says.
    let with_snapshots: Vec<VersionId> = registry
        .entries()
        .iter()
        .filter(|entry| entry.snapshot_dir.is_some())
        .map(|entry| entry.id.clone())
        .collect();

    let mut kept: BTreeSet<VersionId> = with_snapshots
        .iter()
        .rev()
        .take(keep.max(1))
        .cloned()
        .collect();
    if let Some(active) = registry.active() {
        if active.snapshot_dir.is_some() {
            kept.insert(active.id.clone());
        }
    }

    let victims: Vec<VersionId> = with_snapshots
        .iter()
        .filter(|id| !kept.contains(id))
        .cloned()
        .collect();

    let mut report = CleanupReport {
        dry_run,
        deleted: Vec::new(),
        kept: kept.iter().cloned().collect(),
        reclaimed_bytes: 0,
    };

    for id in &victims {
        report.reclaimed_bytes += snapshot_store.size_bytes(id).await?;
    }

    if dry_run {
        report.deleted = victims;
        return Ok(report);
    }

    // Drop the registry pointers first: a pointer to a missing directory
    // is an invariant violation, an orphan directory is only a warning.
    for id in &victims {
        registry.clear_snapshot(id)?;
    }
    registry.save(&registry_path).await?;

    for id in victims {
        if let Err(err) = snapshot_store.delete(&id).await {
            warn!(version = %id, "snapshot delete failed: {err}");
        }
        report.deleted.push(id);
    }

    info!(
        deleted = report.deleted.len(),
        kept = report.kept.len(),
        reclaimed_bytes = report.reclaimed_bytes,
        "cleanup finished"
    );
    Ok(report)
}
