//! Read-only store summary. Takes no lock and mutates nothing, so it can
//! run concurrently with a rebuild.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cache::BuildCache;
use crate::changes::detect_changes;
use crate::corpus;
use crate::engine::MnemeEngine;
use crate::errors::StoreResult;
use crate::models::{CorpusStatus, MemoryKind, StatusReport};
use crate::paths;
use crate::registry::VersionRegistry;
use crate::snapshots::SnapshotStore;

pub(crate) async fn run(engine: &MnemeEngine) -> StoreResult<StatusReport> {
    let settings = engine.settings();
    let cache = BuildCache::load(&paths::cache_path(settings)?).await?;
    let registry = VersionRegistry::load(&paths::registry_path(settings)?).await?;
    let snapshot_store = SnapshotStore::new(paths::snapshots_root(settings)?);

    let mut report = StatusReport {
        active_version: registry.active().cloned(),
        version_count: registry.len(),
        snapshot_count: snapshot_store.list_dirs().await?.len(),
        snapshot_bytes: snapshot_store.total_size().await?,
        ..Default::default()
    };

    for kind in MemoryKind::all() {
        let root = paths::corpus_dir(settings, kind)?;
        let scanned = corpus::scan_corpus(kind, &root).await?;
        let on_disk: BTreeMap<String, String> = scanned
            .into_iter()
            .map(|(path, doc)| (path, doc.fingerprint))
            .collect();
        let cached = cache.fingerprints(kind);
        let pending = detect_changes(&on_disk, &cached);

        // The backend may be closed or unreachable; status still renders.
        let records = match engine.indexer().count(kind).await {
            Ok(count) => Some(count),
            Err(err) => {
                debug!(kind = %kind, "record count unavailable: {err}");
                None
            }
        };

        report.corpora.insert(
            kind,
            CorpusStatus {
                on_disk: on_disk.len(),
                cached: cached.len(),
                pending,
                records,
            },
        );
    }

    Ok(report)
}
