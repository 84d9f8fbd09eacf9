//! Watch mode: debounced incremental rebuilds on corpus changes.

use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::{MnemeEngine, RebuildOptions};
use crate::errors::{StoreError, StoreResult};
use crate::models::MemoryKind;
use crate::paths;

/// Watch the corpus directories and run an incremental rebuild after each
/// burst of filesystem events. A rebuild already in progress elsewhere
/// (`Busy`) just skips the cycle; the pending flag stays down until the
/// next event. Runs until Ctrl-C.
pub async fn run_watcher(engine: &MnemeEngine, debounce: Duration) -> StoreResult<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        })?;

    let mut watched = 0usize;
    for kind in MemoryKind::all() {
        let root = paths::corpus_dir(engine.settings(), kind)?;
        if root.exists() {
            watcher.watch(&root, RecursiveMode::Recursive)?;
            watched += 1;
        }
    }
    if watched == 0 {
        let root = paths::corpus_root(engine.settings())?;
        return Err(StoreError::NotFound(format!(
            "no corpus directories to watch under {}",
            root.display()
        )));
    }
    info!(watched, debounce_ms = debounce.as_millis() as u64, "watching corpus");

    let mut pending = false;
    loop {
        tokio::select! {
            _ = rx.recv() => {
                pending = true;
            }
            _ = tokio::time::sleep(debounce) => {
                if pending {
                    pending = false;
                    match engine.rebuild(RebuildOptions::default()).await {
                        Ok(report) => {
                            if report.total_changes() > 0 {
                                info!(
                                    indexed = report.total_indexed(),
                                    removed = report.total_removed(),
                                    failed = report.total_failed(),
                                    "watch rebuild finished"
                                );
                            }
                        }
                        Err(StoreError::Busy(reason)) => {
                            warn!("skipping watch cycle: {reason}");
                        }
                        Err(err) => {
                            warn!("watch rebuild failed: {err}");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopped");
                return Ok(());
            }
        }
    }
}
