mod common;

use common::{setup, test_settings, write_doc};
use mneme_store::{
    BuildCache, DocumentIndexer, MemoryKind, RebuildOptions, SnapshotStore, StoreError, StoreLock,
    paths,
};

#[tokio::test]
async fn test_only_the_first_version_activates_itself() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    engine.rebuild(RebuildOptions::default()).await.unwrap();

    let v1 = engine
        .create_version(Some("baseline".to_string()))
        .await
        .unwrap();
    assert!(v1.active);
    assert_eq!(v1.description.as_deref(), Some("baseline"));

    write_doc(dir.path(), MemoryKind::Factual, "b.md", "beta");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v2 = engine.create_version(None).await.unwrap();
    assert!(!v2.active);

    let active = engine.active_version().await.unwrap();
    assert_eq!(active.id, v1.id);
}

#[tokio::test]
async fn test_version_seqs_strictly_increase() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    engine.rebuild(RebuildOptions::default()).await.unwrap();

    let mut minted = Vec::new();
    for _ in 0..3 {
        minted.push(engine.create_version(None).await.unwrap().id);
    }

    let listed: Vec<_> = engine
        .list_versions()
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.id)
        .collect();
    assert_eq!(listed, minted);
    assert_eq!(
        listed.iter().map(|id| id.seq()).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_diff_reports_deltas_and_source_changes() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v1 = engine.create_version(None).await.unwrap();

    write_doc(dir.path(), MemoryKind::Factual, "b.md", "beta");
    write_doc(
        dir.path(),
        MemoryKind::Rule,
        "rules.json",
        r#"[{"name": "tone", "body": "Short."}, {"name": "scope", "body": "Narrow."}]"#,
    );
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v2 = engine.create_version(None).await.unwrap();

    let diff = engine.diff_versions(&v1.id, &v2.id).await.unwrap();
    assert_eq!(diff.from, v1.id);
    assert_eq!(diff.to, v2.id);

    let factual = &diff.record_counts[&MemoryKind::Factual];
    assert_eq!((factual.before, factual.after), (1, 2));
    assert_eq!(factual.delta(), 1);
    let rule = &diff.record_counts[&MemoryKind::Rule];
    assert_eq!((rule.before, rule.after), (0, 2));

    assert!(diff.source_changed[&MemoryKind::Factual]);
    assert!(diff.source_changed[&MemoryKind::Rule]);
    assert!(!diff.source_changed[&MemoryKind::Example]);
}

#[tokio::test]
async fn test_rollback_restores_index_and_cache() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, mock) = setup(dir.path());
    let settings = test_settings(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    write_doc(dir.path(), MemoryKind::Factual, "b.md", "beta");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v1 = engine.create_version(None).await.unwrap();
    assert_eq!(v1.record_counts[&MemoryKind::Factual], 2);

    let cache_path = paths::cache_path(&settings).unwrap();
    let fingerprints_at_v1 = BuildCache::load(&cache_path)
        .await
        .unwrap()
        .fingerprints(MemoryKind::Factual);

    write_doc(dir.path(), MemoryKind::Factual, "c.md", "gamma");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    engine.create_version(None).await.unwrap();
    assert_eq!(mock.count(MemoryKind::Factual).await.unwrap(), 3);

    let restored = engine.rollback(&v1.id, false).await.unwrap();
    assert!(restored.active);

    // Index and cache are back at the exact v1 state.
    assert_eq!(mock.count(MemoryKind::Factual).await.unwrap(), 2);
    let cache = BuildCache::load(&cache_path).await.unwrap();
    assert_eq!(cache.fingerprints(MemoryKind::Factual), fingerprints_at_v1);
    assert!(cache.get(MemoryKind::Factual, "c.md").is_none());

    // c.md is still on disk, so the next rebuild sees it as new again.
    let report = engine.rebuild(RebuildOptions::default()).await.unwrap();
    assert_eq!(
        report.corpora[&MemoryKind::Factual].changes.added,
        vec!["c.md"]
    );
}

#[tokio::test]
async fn test_rollback_data_only_keeps_active_pointer() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, mock) = setup(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    write_doc(dir.path(), MemoryKind::Factual, "b.md", "beta");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v1 = engine.create_version(None).await.unwrap();

    write_doc(dir.path(), MemoryKind::Factual, "c.md", "gamma");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v2 = engine.create_version(None).await.unwrap();

    engine.rollback(&v2.id, false).await.unwrap();
    assert_eq!(engine.active_version().await.unwrap().id, v2.id);

    // Data-only restore moves the data back without touching the pointer.
    engine.rollback(&v1.id, true).await.unwrap();
    assert_eq!(mock.count(MemoryKind::Factual).await.unwrap(), 2);
    assert_eq!(engine.active_version().await.unwrap().id, v2.id);
}

#[tokio::test]
async fn test_rollback_unknown_version_is_not_found() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());

    let bogus = "v9_20300101_120000".parse().unwrap();
    assert!(matches!(
        engine.rollback(&bogus, false).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cleanup_keeps_active_and_most_recent() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());
    let settings = test_settings(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v1 = engine.create_version(None).await.unwrap();
    let v2 = engine.create_version(None).await.unwrap();
    let v3 = engine.create_version(None).await.unwrap();

    let report = engine.cleanup(1, false).await.unwrap();

    // v3 is the most recent, v1 is active; only v2 goes.
    assert_eq!(report.deleted, vec![v2.id.clone()]);
    assert_eq!(report.kept, vec![v1.id.clone(), v3.id.clone()]);
    assert!(report.reclaimed_bytes > 0);

    let snapshots = SnapshotStore::new(paths::snapshots_root(&settings).unwrap());
    assert_eq!(
        snapshots.list_dirs().await.unwrap(),
        vec![v1.id.to_string(), v3.id.to_string()]
    );

    // The registry entry survives, minus its snapshot pointer.
    let versions = engine.list_versions().await.unwrap();
    assert_eq!(versions.len(), 3);
    assert!(versions[1].snapshot_dir.is_none());
    assert!(versions[0].snapshot_dir.is_some());
    assert!(versions[2].snapshot_dir.is_some());

    // Rolling back to a cleaned version is refused up front.
    match engine.rollback(&v2.id, false).await {
        Err(StoreError::NotFound(msg)) => assert!(msg.contains("removed by cleanup")),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cleanup_dry_run_deletes_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());
    let settings = test_settings(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    engine.create_version(None).await.unwrap();
    let v2 = engine.create_version(None).await.unwrap();
    engine.create_version(None).await.unwrap();

    let report = engine.cleanup(1, true).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.deleted, vec![v2.id]);

    let snapshots = SnapshotStore::new(paths::snapshots_root(&settings).unwrap());
    assert_eq!(snapshots.list_dirs().await.unwrap().len(), 3);
    assert!(
        engine
            .list_versions()
            .await
            .unwrap()
            .iter()
            .all(|entry| entry.snapshot_dir.is_some())
    );
}

#[tokio::test]
async fn test_create_version_fails_fast_when_locked() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());
    let settings = test_settings(dir.path());

    let _held = StoreLock::acquire(&paths::lock_path(&settings).unwrap(), "rebuild").unwrap();
    assert!(matches!(
        engine.create_version(None).await,
        Err(StoreError::Busy(_))
    ));
}

#[tokio::test]
async fn test_rebuild_creates_version_inline() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    let report = engine
        .rebuild(RebuildOptions {
            create_version: true,
            description: Some("nightly".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let created = report.created_version.unwrap();
    let versions = engine.list_versions().await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].id, created);
    assert_eq!(versions[0].description.as_deref(), Some("nightly"));
    assert!(versions[0].active);
}

#[tokio::test]
async fn test_no_version_is_created_from_a_failed_rebuild() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());

    write_doc(dir.path(), MemoryKind::Example, "bad.json", "{ not json");
    let report = engine
        .rebuild(RebuildOptions {
            create_version: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(report.has_failures());
    assert!(report.created_version.is_none());
    assert!(engine.list_versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_summarizes_store_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let (engine, _mock) = setup(dir.path());

    write_doc(dir.path(), MemoryKind::Factual, "a.md", "alpha");
    write_doc(dir.path(), MemoryKind::Factual, "b.md", "beta");
    engine.rebuild(RebuildOptions::default()).await.unwrap();
    let v1 = engine.create_version(None).await.unwrap();

    // One more document that no rebuild has seen yet.
    write_doc(dir.path(), MemoryKind::Factual, "c.md", "gamma");

    let status = engine.status().await.unwrap();
    assert_eq!(status.version_count, 1);
    assert_eq!(status.snapshot_count, 1);
    assert!(status.snapshot_bytes > 0);
    assert_eq!(status.active_version.unwrap().id, v1.id);

    let factual = &status.corpora[&MemoryKind::Factual];
    assert_eq!(factual.on_disk, 3);
    assert_eq!(factual.cached, 2);
    assert_eq!(factual.pending.added, vec!["c.md"]);
    assert_eq!(factual.records, Some(2));
}
