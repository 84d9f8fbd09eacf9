//! Pure diff between a corpus scan and a cache arena. No filesystem or
//! index access happens here; the same inputs always give the same answer.

use std::collections::BTreeMap;

use crate::models::ChangeSet;

/// Compare on-disk fingerprints against cached ones for a single corpus.
///
/// Added: on disk, not in the cache. Deleted: in the cache, not on disk.
/// Modified: in both with differing fingerprints. Documents whose
/// fingerprint matches the cache are absent from the result entirely.
pub fn detect_changes(
    on_disk: &BTreeMap<String, String>,
    cached: &BTreeMap<String, String>,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, fingerprint) in on_disk {
        match cached.get(path) {
            None => changes.added.push(path.clone()),
            Some(previous) if previous != fingerprint => changes.modified.push(path.clone()),
            Some(_) => {}
        }
    }

    for path in cached.keys() {
        if !on_disk.contains_key(path) {
            changes.deleted.push(path.clone());
        }
    }

    changes
}
