//! The rebuild orchestrator: scan, diff, reindex, flush.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::cache::BuildCache;
use crate::changes::detect_changes;
use crate::corpus;
use crate::engine::{MnemeEngine, RebuildOptions};
use crate::errors::{StoreError, StoreResult};
use crate::lock::StoreLock;
use crate::models::{ChangeSet, CorpusReport, IndexFailure, MemoryKind, RebuildReport};
use crate::paths;

pub(crate) async fn run(
    engine: &MnemeEngine,
    options: RebuildOptions,
) -> StoreResult<RebuildReport> {
    let settings = engine.settings();
    let started_at = Utc::now();
    let timer = Instant::now();
    let kinds = options
        .kinds
        .clone()
        .unwrap_or_else(|| MemoryKind::all().to_vec());

    // A dry run is a pure read: no lock, no cache writes, no indexing.
    let _lock = if options.dry_run {
        None
    } else {
        Some(StoreLock::acquire(&paths::lock_path(settings)?, "rebuild")?)
    };

    let cache_path = paths::cache_path(settings)?;
    let mut cache = BuildCache::load(&cache_path).await?;
    let mut corpora = BTreeMap::new();

    for kind in kinds {
        let root = paths::corpus_dir(settings, kind)?;
        let scanned = corpus::scan_corpus(kind, &root).await?;
        let on_disk: BTreeMap<String, String> = scanned
            .into_iter()
            .map(|(path, doc)| (path, doc.fingerprint))
            .collect();
        let cached = cache.fingerprints(kind);

        let changes = if options.force {
            force_changes(&on_disk, &cached)
        } else {
            detect_changes(&on_disk, &cached)
        };
        info!(
            kind = %kind,
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            "change detection complete"
        );

        if options.dry_run {
            corpora.insert(
                kind,
                CorpusReport {
                    changes,
                    ..Default::default()
                },
            );
            continue;
        }

        let mut report = CorpusReport {
            changes: changes.clone(),
            ..Default::default()
        };

        for path in changes.added.iter().chain(changes.modified.iter()) {
            match index_document(engine, kind, &root, path).await {
                Ok(fingerprint) => {
                    cache.record_indexed(kind, path, fingerprint);
                    report.indexed += 1;
                }
                // A dead backend fails every following document the same
                // way; stop now but keep what already succeeded.
                Err(err @ StoreError::BackendUnavailable(_)) => {
                    cache.save(&cache_path).await?;
                    return Err(err);
                }
                Err(err) => {
                    warn!(kind = %kind, path = %path, "index failed: {err}");
                    report.failures.push(IndexFailure {
                        path: path.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        for path in &changes.deleted {
            match engine.indexer().delete(kind, path).await {
                Ok(()) => {
                    cache.remove(kind, path);
                    report.removed += 1;
                }
                Err(err) => {
                    warn!(kind = %kind, path = %path, "delete failed: {err}");
                    report.failures.push(IndexFailure {
                        path: path.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        // Flush after each corpus so an interrupted run keeps the work
        // completed so far.
        cache.save(&cache_path).await?;
        corpora.insert(kind, report);
    }

    let mut report = RebuildReport {
        started_at,
        duration_ms: timer.elapsed().as_millis() as u64,
        force: options.force,
        dry_run: options.dry_run,
        corpora,
        cache_persisted: !options.dry_run,
        created_version: None,
    };

    if options.create_version && !options.dry_run {
        if report.has_failures() {
            warn!(
                failed = report.total_failed(),
                "skipping version creation: rebuild had failures"
            );
        } else {
            // Reuse the lock held for this run; taking a second one here
            // would deadlock against ourselves.
            let entry = super::versions::create_locked(engine, options.description.clone()).await?;
            report.created_version = Some(entry.id.clone());
        }
    }

    info!(
        dry_run = report.dry_run,
        changes = report.total_changes(),
        indexed = report.total_indexed(),
        removed = report.total_removed(),
        failed = report.total_failed(),
        duration_ms = report.duration_ms,
        "rebuild finished"
    );
    Ok(report)
}

/// Force mode: every document on disk gets reindexed; cache rows without a
/// matching file are still deletions.
fn force_changes(
    on_disk: &BTreeMap<String, String>,
    cached: &BTreeMap<String, String>,
) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for path in on_disk.keys() {
        if cached.contains_key(path) {
            changes.modified.push(path.clone());
        } else {
            changes.added.push(path.clone());
        }
    }
    for path in cached.keys() {
        if !on_disk.contains_key(path) {
            changes.deleted.push(path.clone());
        }
    }
    changes
}

/// Load and index one document, returning the fingerprint of the content
/// that was actually indexed.
async fn index_document(
    engine: &MnemeEngine,
    kind: MemoryKind,
    root: &Path,
    rel_path: &str,
) -> StoreResult<String> {
    let doc = corpus::load_document(kind, root, rel_path).await?;
    engine.indexer().index(kind, rel_path, &doc.content).await?;
    Ok(doc.fingerprint)
}
